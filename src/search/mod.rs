//! 搜索模块
//!
//! 按平台规则排出音源的尝试顺序，逐个尝试，返回第一个非空结果。
//! 尝试严格串行，顺序本身是正确性的一部分。

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{MusicSource, SourceRegistry},
    error::{AttemptError, EngineError, Result},
    geo::GeoDetector,
    health::HealthTracker,
    model::track::{Platform, SearchOutcome, SearchParams},
    providers::{ProviderFamily, ProviderSet},
};

/// 搜索的尝试顺序，按阶段划分。
///
/// 只有 QQ 音乐会有第二阶段：两代 vkeys 都失败后，再退到其余所有音源。
pub type TryOrder<'a> = Vec<Vec<&'a MusicSource>>;

fn is_generic(source: &MusicSource) -> bool {
    source.family() != Some(ProviderFamily::Native)
}

/// 计算一次搜索的尝试顺序。
///
/// 本地原生接口不在其中，它只在地区探测为中国大陆时作为前置步骤使用。
/// 播客或哔哩哔哩没有任何可用音源时立即返回 `Configuration` 错误。
pub fn search_try_order<'a>(registry: &'a SourceRegistry, params: &SearchParams) -> Result<TryOrder<'a>> {
    if params.is_podcast() {
        let backups: Vec<_> = registry
            .enabled_of_family(ProviderFamily::NeteaseCompatible)
            .collect();
        if backups.is_empty() {
            return Err(EngineError::Configuration(
                "播客搜索需要至少一个已启用的网易云备用音源".into(),
            ));
        }
        return Ok(vec![backups]);
    }

    match params.platform {
        Platform::Bilibili => {
            let bilibili: Vec<_> = registry
                .enabled_of_family(ProviderFamily::Bilibili)
                .take(1)
                .collect();
            if bilibili.is_empty() {
                return Err(EngineError::Configuration("哔哩哔哩音源未启用".into()));
            }
            Ok(vec![bilibili])
        }
        Platform::Tencent => {
            let primary: Vec<_> = ["vkeys-v3", "vkeys-v2"]
                .iter()
                .filter_map(|id| registry.enabled_by_id(id))
                .collect();
            let widened: Vec<_> = registry
                .enabled_sources()
                .filter(|s| is_generic(s) && !s.family().is_some_and(ProviderFamily::is_vkeys))
                .collect();
            Ok(vec![primary, widened])
        }
        Platform::Netease | Platform::NeteasePodcast => {
            let mut order: Vec<&MusicSource> = registry
                .enabled_of_family(ProviderFamily::NeteaseCompatible)
                .collect();
            order.extend(registry.enabled_by_id("vkeys-v2"));
            for source in registry.enabled_sources().filter(|s| is_generic(s)) {
                if !order.iter().any(|s| s.id == source.id) {
                    order.push(source);
                }
            }
            Ok(vec![order])
        }
    }
}

/// 原生接口的结果之后应交给哪个音源解析链接。
pub fn native_resolve_source(registry: &SourceRegistry, platform: Platform) -> Option<String> {
    let source = match platform {
        Platform::Tencent => registry
            .enabled_by_id("vkeys-v3")
            .or_else(|| registry.enabled_by_id("vkeys-v2")),
        _ => registry
            .enabled_of_family(ProviderFamily::NeteaseCompatible)
            .next()
            .or_else(|| registry.enabled_by_id("vkeys-v2")),
    };
    source.map(|s| s.id.clone())
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// 单个音源的一次尝试结果。
enum Attempt {
    Found(SearchOutcome),
    Empty,
    Failed,
}

/// 搜索编排器，借用引擎的注册表、音源实现与状态。
pub struct SearchOrchestrator<'a> {
    registry: &'a SourceRegistry,
    providers: &'a ProviderSet,
    health: &'a HealthTracker,
    geo: &'a GeoDetector,
}

impl<'a> SearchOrchestrator<'a> {
    /// 创建编排器。
    pub fn new(
        registry: &'a SourceRegistry,
        providers: &'a ProviderSet,
        health: &'a HealthTracker,
        geo: &'a GeoDetector,
    ) -> Self {
        Self {
            registry,
            providers,
            health,
            geo,
        }
    }

    /// 执行搜索。
    ///
    /// # 返回
    /// * `Ok` - 第一个非空结果；所有应答的音源都没有匹配项时为空列表。
    /// * `Err(Cancelled)` - 开始前或任意两次尝试之间被取消。
    /// * `Err(AllSourcesExhausted)` - 没有任何音源正常应答，按尝试顺序附带每次失败的原因。
    pub async fn search(
        &self,
        params: &SearchParams,
        cancel: Option<&CancellationToken>,
    ) -> Result<SearchOutcome> {
        check_cancelled(cancel)?;
        let phases = search_try_order(self.registry, params)?;

        info!(
            "[Search] 开始搜索 '{}' (平台: {}, 类型: {})",
            params.keywords,
            params.platform,
            params.search_type.code()
        );

        let mut attempts = Vec::new();
        let mut first_answer: Option<String> = None;

        if let Some(native) = self.native_candidate(params).await {
            check_cancelled(cancel)?;
            match self.attempt(native, params, &mut attempts).await {
                Attempt::Found(mut outcome) => {
                    outcome.resolve_source_id = native_resolve_source(self.registry, params.platform);
                    return Ok(outcome);
                }
                Attempt::Empty => first_answer = first_answer.or(Some(native.id.clone())),
                Attempt::Failed => {}
            }
        }

        for (phase, sources) in phases.iter().enumerate() {
            if phase > 0 {
                info!("[Search] 首选音源均未命中，扩大到其余 {} 个音源", sources.len());
            }
            for source in sources {
                check_cancelled(cancel)?;
                match self.attempt(source, params, &mut attempts).await {
                    Attempt::Found(outcome) => return Ok(outcome),
                    Attempt::Empty => {
                        first_answer.get_or_insert_with(|| source.id.clone());
                    }
                    Attempt::Failed => {}
                }
            }
        }

        if let Some(source_id) = first_answer {
            info!("[Search] 所有音源均无匹配结果");
            return Ok(SearchOutcome {
                source_id,
                tracks: Vec::new(),
                resolve_source_id: None,
            });
        }

        if attempts.is_empty() {
            return Err(EngineError::Configuration(format!(
                "平台 {} 没有任何已启用的音源",
                params.platform
            )));
        }
        warn!("[Search] 所有 {} 个音源均失败", attempts.len());
        Err(EngineError::AllSourcesExhausted { attempts })
    }

    /// 部署在中国大陆时，网易云与 QQ 音乐的单曲搜索先走本地原生接口。
    async fn native_candidate(&self, params: &SearchParams) -> Option<&'a MusicSource> {
        if params.is_podcast() || !matches!(params.platform, Platform::Netease | Platform::Tencent) {
            return None;
        }
        let native = self.registry.enabled_of_family(ProviderFamily::Native).next()?;
        self.geo.is_china().await.then_some(native)
    }

    async fn attempt(
        &self,
        source: &MusicSource,
        params: &SearchParams,
        attempts: &mut Vec<AttemptError>,
    ) -> Attempt {
        let provider = match self.providers.for_source(source) {
            Ok(provider) => provider,
            Err(e) => {
                attempts.push(AttemptError::new(&source.id, e));
                return Attempt::Failed;
            }
        };

        debug!("[Search] 尝试音源 {}", source.id);
        let started = Instant::now();
        match provider.search(source, params).await {
            Ok(tracks) => {
                self.health.record_success(&source.id, started.elapsed());
                if tracks.is_empty() {
                    info!("[Search] 音源 {} 没有匹配结果，继续下一个", source.id);
                    return Attempt::Empty;
                }
                info!("[Search] 音源 {} 返回 {} 条结果", source.id, tracks.len());
                Attempt::Found(SearchOutcome {
                    source_id: source.id.clone(),
                    tracks,
                    resolve_source_id: None,
                })
            }
            Err(e) => {
                warn!("[Search] 音源 {} 搜索失败: {}", source.id, e);
                self.health
                    .record_failure(&source.id, e.to_string(), started.elapsed());
                attempts.push(AttemptError::new(&source.id, e));
                Attempt::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{MusicSource, RegionMode},
        model::health::HealthStatus,
        test_support::{Harness, init_tracing},
    };
    use serde_json::json;

    const ALL: &[&str] = &[
        "netease-backup-1",
        "netease-backup-2",
        "vkeys-v2",
        "vkeys-v3",
        "meting-1",
        "bilibili",
        "native-api",
    ];

    fn ids(order: &TryOrder<'_>) -> Vec<Vec<String>> {
        order
            .iter()
            .map(|phase| phase.iter().map(|s| s.id.clone()).collect())
            .collect()
    }

    fn cloud_song(name: &str) -> serde_json::Value {
        json!({"code": 200, "result": {"songs": [{"id": 186001, "name": name, "ar": [{"name": "周杰伦"}]}]}})
    }

    #[test]
    fn netease_order_is_backups_then_v2_then_rest() {
        let harness = Harness::new(ALL, RegionMode::Overseas);
        let order = search_try_order(&harness.registry, &SearchParams::new("x", Platform::Netease)).unwrap();
        assert_eq!(
            ids(&order),
            vec![vec!["netease-backup-1", "netease-backup-2", "vkeys-v2", "vkeys-v3", "meting-1", "bilibili"]]
        );
    }

    #[test]
    fn tencent_order_has_two_phases() {
        let harness = Harness::new(ALL, RegionMode::Overseas);
        let order = search_try_order(&harness.registry, &SearchParams::new("x", Platform::Tencent)).unwrap();
        assert_eq!(
            ids(&order),
            vec![
                vec!["vkeys-v3", "vkeys-v2"],
                vec!["netease-backup-1", "netease-backup-2", "meting-1", "bilibili"],
            ]
        );
    }

    #[test]
    fn podcast_and_bilibili_orders() {
        let harness = Harness::new(ALL, RegionMode::Overseas);
        let podcast = SearchParams::new("x", Platform::Tencent).podcast();
        assert_eq!(
            ids(&search_try_order(&harness.registry, &podcast).unwrap()),
            vec![vec!["netease-backup-1", "netease-backup-2"]]
        );
        let bili = SearchParams::new("x", Platform::Bilibili);
        assert_eq!(
            ids(&search_try_order(&harness.registry, &bili).unwrap()),
            vec![vec!["bilibili"]]
        );
    }

    #[test]
    fn disabled_sources_are_skipped() {
        let mut sources: Vec<MusicSource> = ALL.iter().map(|id| crate::test_support::source(id)).collect();
        sources[0].enabled = false;
        sources[2].enabled = false;
        let harness = Harness::with_sources(sources, RegionMode::Overseas);
        let order = search_try_order(&harness.registry, &SearchParams::new("x", Platform::Netease)).unwrap();
        assert_eq!(ids(&order)[0][..2], ["netease-backup-2", "vkeys-v3"]);
    }

    #[tokio::test]
    async fn second_backup_wins_when_first_fails() {
        init_tracing();
        let harness = Harness::new(ALL, RegionMode::Overseas);
        harness.transport.fail("netease-backup-1.test");
        harness.transport.on_json("netease-backup-2.test/cloudsearch", cloud_song("稻香"));

        let outcome = harness
            .orchestrator()
            .search(&SearchParams::new("稻香", Platform::Netease), None)
            .await
            .unwrap();

        assert_eq!(outcome.source_id, "netease-backup-2");
        assert!(!outcome.tracks.is_empty());
        assert_eq!(harness.health.get("netease-backup-1").status, HealthStatus::Error);
        assert_eq!(harness.health.get("netease-backup-2").status, HealthStatus::Online);
        assert_eq!(harness.health.get("vkeys-v2").status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn tencent_widens_after_both_vkeys_fail() {
        let harness = Harness::new(ALL, RegionMode::Overseas);
        harness.transport.fail("vkeys-v3.test");
        harness.transport.fail("vkeys-v2.test");
        harness.transport.on_json("netease-backup-1.test/cloudsearch", cloud_song("稻香"));

        let outcome = harness
            .orchestrator()
            .search(&SearchParams::new("稻香", Platform::Tencent), None)
            .await
            .unwrap();

        assert_eq!(outcome.source_id, "netease-backup-1");
        let urls = harness.transport.urls();
        assert!(urls[0].starts_with("http://vkeys-v3.test"));
        assert!(urls[1].starts_with("http://vkeys-v2.test"));
    }

    #[tokio::test]
    async fn exhausted_lists_attempts_in_order() {
        let harness = Harness::new(&["netease-backup-1", "vkeys-v2", "meting-1"], RegionMode::Overseas);
        harness.transport.fail(".test");

        let err = harness
            .orchestrator()
            .search(&SearchParams::new("稻香", Platform::Netease), None)
            .await
            .unwrap_err();

        let attempted: Vec<_> = err
            .attempts()
            .unwrap()
            .iter()
            .map(|a| a.source_id.as_str())
            .collect();
        assert_eq!(attempted, ["netease-backup-1", "vkeys-v2", "meting-1"]);
    }

    #[tokio::test]
    async fn empty_answers_are_not_failures() {
        let harness = Harness::new(&["netease-backup-1", "vkeys-v2"], RegionMode::Overseas);
        harness
            .transport
            .on_json("/cloudsearch", json!({"code": 200, "result": {"songs": []}}));
        harness.transport.fail("vkeys-v2.test");

        let outcome = harness
            .orchestrator()
            .search(&SearchParams::new("不存在的歌", Platform::Netease), None)
            .await
            .unwrap();

        assert_eq!(outcome.source_id, "netease-backup-1");
        assert!(outcome.tracks.is_empty());
        assert_eq!(harness.transport.count_matching("vkeys-v2.test"), 1);
    }

    #[tokio::test]
    async fn podcast_without_backup_fails_immediately() {
        let harness = Harness::new(&["vkeys-v2", "vkeys-v3", "meting-1"], RegionMode::Auto);

        let err = harness
            .orchestrator()
            .search(&SearchParams::new("晚安", Platform::Netease).podcast(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Configuration(_)));
        assert_eq!(harness.transport.count(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let harness = Harness::new(ALL, RegionMode::Auto);
        let token = CancellationToken::new();
        token.cancel();

        let err = harness
            .orchestrator()
            .search(&SearchParams::new("稻香", Platform::Netease), Some(&token))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(harness.transport.count(), 0);
    }

    #[tokio::test]
    async fn cancelled_mid_search_stops_before_next_source() {
        let harness = Harness::new(&["netease-backup-1", "vkeys-v2"], RegionMode::Overseas);
        let token = CancellationToken::new();
        harness.transport.cancel_on_call(token.clone());
        harness.transport.fail("netease-backup-1.test");
        harness
            .transport
            .on_json("vkeys-v2.test", json!({"code": 200, "data": []}));

        let err = harness
            .orchestrator()
            .search(&SearchParams::new("稻香", Platform::Netease), Some(&token))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Cancelled));
        // 第一个音源内部的普通搜索重试仍属于同一次尝试
        assert!(harness.transport.count_matching("netease-backup-1.test") >= 1);
        assert_eq!(harness.transport.count_matching("vkeys-v2.test"), 0);
        assert_eq!(harness.health.get("vkeys-v2").status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn native_success_records_downstream_source() {
        let harness = Harness::new(ALL, RegionMode::China);
        harness.transport.on_json(
            "/api/native-api/search/wy",
            json!({"code": 200, "data": [{"id": 186001, "name": "稻香", "artist": "周杰伦"}]}),
        );

        let outcome = harness
            .orchestrator()
            .search(&SearchParams::new("稻香", Platform::Netease), None)
            .await
            .unwrap();

        assert_eq!(outcome.source_id, "native-api");
        assert_eq!(outcome.resolve_source_id.as_deref(), Some("netease-backup-1"));
        assert_eq!(harness.transport.count(), 1);
    }

    #[tokio::test]
    async fn native_failure_falls_through_to_try_order() {
        let harness = Harness::new(&["native-api", "netease-backup-1"], RegionMode::China);
        harness.transport.fail("native-api.test");
        harness.transport.on_json("/cloudsearch", cloud_song("稻香"));

        let outcome = harness
            .orchestrator()
            .search(&SearchParams::new("稻香", Platform::Netease), None)
            .await
            .unwrap();

        assert_eq!(outcome.source_id, "netease-backup-1");
        assert_eq!(outcome.resolve_source_id, None);
    }
}
