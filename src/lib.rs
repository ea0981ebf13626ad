#![warn(missing_docs)]

//! # Song Source Engine
//!
//! 点歌系统的多音源聚合引擎。给定一组可能随时失效的第三方音乐接口，
//! 按确定的顺序逐个回退，得到规范化的搜索结果、经过校验的播放链接和歌词。
//!
//! ## 主要功能
//!
//! - **搜索**: 网易云（含播客）、QQ 音乐、哔哩哔哩，按平台规则依次尝试各音源。
//! - **链接解析**: 逐个音源解析候选链接，升级为 HTTPS 并做 HEAD 探测，只返回可播放的链接。
//! - **歌词**: vkeys、社区 TTML 歌词库、网易云官方接口与 Meting 按策略组合。
//! - **健康状态**: 记录每个音源最近一次调用的结果。
//!
//! ## 示例
//!
//! ```rust,no_run
//! use song_source_engine::{EngineConfig, MusicEngine};
//! use song_source_engine::model::track::{Platform, ResolveOptions, SearchParams};
//!
//! async {
//!     let engine = MusicEngine::new(EngineConfig::load().unwrap()).unwrap();
//!
//!     let params = SearchParams::new("稻香", Platform::Netease);
//!     match engine.search(&params, None).await {
//!         Ok(outcome) => {
//!             println!("{} 返回了 {} 首歌", outcome.source_id, outcome.tracks.len());
//!             if let Some(track) = outcome.tracks.first() {
//!                 let resolution = engine
//!                     .resolve_track(track, &outcome, None, &ResolveOptions::default())
//!                     .await;
//!                 println!("播放链接: {:?}", resolution.url);
//!             }
//!         }
//!         Err(e) => eprintln!("搜索失败: {}", e),
//!     }
//! };
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod health;
pub mod http;
pub mod lyrics;
pub mod model;
pub mod normalize;
pub mod providers;
pub mod resolve;
pub mod search;
pub mod validator;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use tokio_util::sync::CancellationToken;

pub use crate::{
    config::{EngineConfig, MusicSource, SourceRegistry},
    error::{EngineError, Result},
    model::track::{SearchOutcome, Track},
};

use crate::{
    geo::GeoDetector,
    health::HealthTracker,
    http::{HttpTransport, ReqwestTransport},
    lyrics::{LyricsResolver, amll::TtmlDatabase},
    model::{
        health::{HealthSummary, SourceStatus},
        track::{
            LyricsResponse, Platform, ResolveOptions, ResolvedUrl, SearchParams, UrlResolution,
            is_podcast,
        },
    },
    providers::ProviderSet,
    resolve::{ResolveInput, UrlResolver},
    search::SearchOrchestrator,
    validator::LinkValidator,
};

// ==========================================================
//  顶层 API
// ==========================================================

/// 顶层引擎，持有配置、音源实现与运行状态，为调用方提供统一的接口。
///
/// 这是与本库交互的主要入口点。可以在多个任务间通过 `Arc` 共享。
pub struct MusicEngine {
    config: EngineConfig,
    registry: SourceRegistry,
    providers: ProviderSet,
    health: HealthTracker,
    geo: GeoDetector,
    validator: LinkValidator,
    ttml_db: TtmlDatabase,
}

impl MusicEngine {
    /// 使用基于 `reqwest` 的传输层创建引擎。
    pub fn new(config: EngineConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// 使用自定义传输层创建引擎。
    ///
    /// # 返回
    /// 音源 ID 重复或无法识别时返回 `Configuration` 错误。
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let registry = SourceRegistry::new(config.sources.clone())?;
        let providers = ProviderSet::new(transport.clone(), &registry);
        let health = HealthTracker::new(registry.all().iter().map(|s| s.id.clone()).collect());
        let geo = GeoDetector::new(transport.clone(), config.region, config.geo_probe_url.clone());
        let validator = LinkValidator::new(transport.clone(), config.validation_timeout());
        let ttml_db = TtmlDatabase::new(transport, &config.ttml_database_url);

        tracing::info!(
            "[Main] 引擎初始化完成，共 {} 个音源，其中 {} 个已启用。",
            registry.all().len(),
            registry.enabled_sources().count()
        );

        Ok(Self {
            config,
            registry,
            providers,
            health,
            geo,
            validator,
            ttml_db,
        })
    }

    /// 按平台规则依次尝试各音源搜索歌曲。
    ///
    /// # 参数
    /// * `params` - 搜索参数。
    /// * `cancel` - 可选的取消令牌，在每次尝试音源之前检查。
    ///
    /// # 返回
    /// * `Ok(SearchOutcome)` - 第一个非空结果；所有应答的音源都没有匹配项时 `tracks` 为空。
    /// * `Err(EngineError::Cancelled)` - 被取消。
    /// * `Err(EngineError::Configuration)` - 没有任何已启用的音源支持该请求。
    /// * `Err(EngineError::AllSourcesExhausted)` - 所有音源都失败了。
    pub async fn search(
        &self,
        params: &SearchParams,
        cancel: Option<&CancellationToken>,
    ) -> Result<SearchOutcome> {
        SearchOrchestrator::new(&self.registry, &self.providers, &self.health, &self.geo)
            .search(params, cancel)
            .await
    }

    /// 解析一首歌的播放链接，返回经过校验的 HTTPS 链接。
    ///
    /// `quality` 为空时使用配置中该平台的默认音质。
    pub async fn resolve(
        &self,
        platform: Platform,
        external_id: &str,
        quality: Option<u32>,
        cookie: Option<&str>,
        options: &ResolveOptions,
    ) -> Result<ResolvedUrl> {
        let input = ResolveInput {
            platform,
            external_id,
            quality,
            cookie,
            options,
        };
        UrlResolver::new(
            &self.config,
            &self.registry,
            &self.providers,
            &self.health,
            &self.validator,
        )
        .resolve(&input)
        .await
    }

    /// 与 [`MusicEngine::resolve`] 相同，但把结果包装成对外的 `{success, url, error}` 结构。
    ///
    /// `platform` 为空时视为网易云。
    pub async fn resolve_url(
        &self,
        external_id: &str,
        quality: Option<u32>,
        platform: Option<Platform>,
        cookie: Option<&str>,
        options: &ResolveOptions,
    ) -> UrlResolution {
        let platform = platform.unwrap_or_default();
        match self.resolve(platform, external_id, quality, cookie, options).await {
            Ok(resolved) => UrlResolution {
                success: true,
                url: Some(resolved.url),
                source_id: Some(resolved.source_id),
                error: None,
            },
            Err(e) => {
                tracing::warn!("[Main] {} {} 的链接解析失败: {}", platform, external_id, e);
                UrlResolution {
                    success: false,
                    url: None,
                    source_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// 解析一条搜索结果的播放链接。
    ///
    /// 结果来自本地原生接口时，优先使用搜索时记录的下游音源；
    /// 判定为播客的歌曲按播客平台解析（默认不解灰）。
    pub async fn resolve_track(
        &self,
        track: &Track,
        outcome: &SearchOutcome,
        quality: Option<u32>,
        options: &ResolveOptions,
    ) -> UrlResolution {
        let platform = if is_podcast(track) {
            Platform::NeteasePodcast
        } else {
            track.platform
        };

        let mut options = options.clone();
        if options.preferred_source.is_none() {
            options.preferred_source = outcome.resolve_source_id.clone();
        }
        if platform == Platform::Bilibili && options.bilibili_cid.is_none() {
            options.bilibili_cid = track
                .provenance
                .hints
                .get("cid")
                .and_then(providers::value_as_id);
        }

        self.resolve_url(&track.external_id, quality, Some(platform), None, &options)
            .await
    }

    /// 按配置的歌词策略获取歌词。
    pub async fn get_lyrics(&self, platform: Platform, id: &str) -> LyricsResponse {
        LyricsResolver::new(&self.config, &self.registry, &self.providers, &self.ttml_db)
            .get_lyrics(platform, id)
            .await
    }

    /// 所有已配置音源的最近状态，按配置顺序。
    pub fn source_health(&self) -> Vec<SourceStatus> {
        self.health.all()
    }

    /// 健康状态汇总。
    pub fn health_summary(&self) -> HealthSummary {
        self.health.summary()
    }

    /// 校验过的音源列表。
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// 当前配置。
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 清空健康状态与缓存的地区探测结果。
    pub fn reset_state(&self) {
        self.health.reset();
        self.geo.reset();
        tracing::info!("[Main] 运行状态已重置。");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RegionMode,
        model::health::HealthStatus,
        test_support::{FakeTransport, audio_response, source},
    };
    use serde_json::json;

    fn engine(ids: &[&str]) -> (MusicEngine, Arc<FakeTransport>) {
        let transport = FakeTransport::new();
        let config = EngineConfig {
            sources: ids.iter().map(|id| source(id)).collect(),
            region: RegionMode::Overseas,
            ..Default::default()
        };
        let engine = MusicEngine::with_transport(config, transport.clone()).unwrap();
        (engine, transport)
    }

    #[test]
    fn rejects_duplicate_sources() {
        let config = EngineConfig {
            sources: vec![source("vkeys-v2"), source("vkeys-v2")],
            ..Default::default()
        };
        let result = MusicEngine::with_transport(config, FakeTransport::new());
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[tokio::test]
    async fn native_results_resolve_through_recorded_source() {
        let (engine, transport) = engine(&["netease-backup-1", "vkeys-v2"]);
        transport.on_json(
            "vkeys-v2.test/netease?",
            json!({"code": 200, "data": {"url": "http://m701.music.126.net/a.mp3"}}),
        );
        transport.on_json(
            "netease-backup-1.test/song/url",
            json!({"code": 200, "data": [{"url": "http://m801.music.126.net/b.mp3"}]}),
        );
        transport.on("music.126.net", audio_response());

        let track = Track::new(Platform::Netease, "186001", "稻香", "周杰伦", "native-api");
        let outcome = SearchOutcome {
            source_id: "native-api".into(),
            tracks: vec![track.clone()],
            resolve_source_id: Some("vkeys-v2".into()),
        };

        let resolution = engine
            .resolve_track(&track, &outcome, None, &ResolveOptions::default())
            .await;

        assert!(resolution.success);
        assert_eq!(resolution.source_id.as_deref(), Some("vkeys-v2"));
        assert_eq!(resolution.url.as_deref(), Some("https://m701.music.126.net/a.mp3"));
        assert_eq!(transport.count_matching("netease-backup-1.test"), 0);
    }

    #[tokio::test]
    async fn voice_tracks_resolve_as_podcasts_without_unblock() {
        let (engine, transport) = engine(&["netease-backup-1"]);
        transport.on_json(
            "/song/url/v1",
            json!({"code": 200, "data": [{"url": "https://m801.music.126.net/v.m4a"}]}),
        );
        transport.on("music.126.net", audio_response());

        let track = Track::new(Platform::Netease, "2063", "晚安电台", "主播", "netease-backup-1")
            .with_hint("type", "voice");
        let outcome = SearchOutcome {
            source_id: "netease-backup-1".into(),
            tracks: vec![track.clone()],
            resolve_source_id: None,
        };

        let resolution = engine
            .resolve_track(&track, &outcome, None, &ResolveOptions::default())
            .await;

        assert!(resolution.success);
        let request = transport
            .requests()
            .into_iter()
            .find(|r| r.url.ends_with("/song/url/v1"))
            .unwrap();
        assert_eq!(request.query_value("unblock"), Some("false"));
    }

    #[tokio::test]
    async fn resolve_url_reports_failures_as_data() {
        let (engine, transport) = engine(&["vkeys-v2"]);
        transport.fail("vkeys-v2.test");

        let resolution = engine
            .resolve_url("003aAYrm3GE0Ac", None, Some(Platform::Tencent), None, &ResolveOptions::default())
            .await;

        assert!(!resolution.success);
        assert!(resolution.error.unwrap().contains("vkeys-v2"));
        assert_eq!(engine.health_summary().error, 1);
    }

    #[tokio::test]
    async fn reset_state_clears_health() {
        let (engine, transport) = engine(&["netease-backup-1", "vkeys-v2"]);
        transport.fail("netease-backup-1.test");
        transport.on_json("vkeys-v2.test/netease", json!({"code": 200, "data": []}));

        let _ = engine.search(&SearchParams::new("稻香", Platform::Netease), None).await;
        assert_eq!(engine.source_health()[0].status, HealthStatus::Error);

        engine.reset_state();
        assert!(engine.source_health().iter().all(|s| s.status == HealthStatus::Unknown));
        assert_eq!(engine.health_summary().offline, 2);
    }
}
