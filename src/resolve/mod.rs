//! 播放链接解析模块
//!
//! 按平台规则排出音源顺序，逐个解析候选链接，升级为 HTTPS 并校验，
//! 返回第一个通过校验的链接。校验不通过的链接不会返回给调用方。

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::{
    config::{EngineConfig, MusicSource, SourceRegistry},
    error::{AttemptError, EngineError, Result},
    health::HealthTracker,
    model::track::{Platform, ResolveOptions, ResolvedUrl},
    providers::{ProviderFamily, ProviderSet, ResolveRequest},
    validator::{LinkValidator, upgrade_to_https},
};

pub mod quality;

/// 计算解析链接时的音源顺序。
///
/// * 哔哩哔哩：唯一的哔哩哔哩音源。
/// * QQ 音乐：vkeys v3，vkeys v2。
/// * 网易云（含播客）：网易云备用音源，vkeys v2，Meting，其余能解析该平台的音源。
///
/// `preferred` 指定且已启用时，该音源被移到最前。
pub fn resolve_try_order<'a>(
    registry: &'a SourceRegistry,
    providers: &ProviderSet,
    platform: Platform,
    preferred: Option<&str>,
) -> Result<Vec<&'a MusicSource>> {
    let mut order: Vec<&MusicSource> = match platform {
        Platform::Bilibili => registry
            .enabled_of_family(ProviderFamily::Bilibili)
            .take(1)
            .collect(),
        Platform::Tencent => ["vkeys-v3", "vkeys-v2"]
            .iter()
            .filter_map(|id| registry.enabled_by_id(id))
            .collect(),
        Platform::Netease | Platform::NeteasePodcast => {
            let mut order: Vec<&MusicSource> = registry
                .enabled_of_family(ProviderFamily::NeteaseCompatible)
                .collect();
            order.extend(registry.enabled_by_id("vkeys-v2"));
            order.extend(registry.enabled_of_family(ProviderFamily::Meting));
            for source in registry.enabled_sources() {
                let supported = providers
                    .for_source(source)
                    .is_ok_and(|p| p.supports_resolve(platform));
                if supported && !order.iter().any(|s| s.id == source.id) {
                    order.push(source);
                }
            }
            order
        }
    };

    if let Some(preferred) = preferred.and_then(|id| registry.enabled_by_id(id)) {
        let supported = providers
            .for_source(preferred)
            .is_ok_and(|p| p.supports_resolve(platform));
        if supported {
            order.retain(|s| s.id != preferred.id);
            order.insert(0, preferred);
        }
    }

    if order.is_empty() {
        return Err(EngineError::Configuration(format!(
            "平台 {platform} 没有任何已启用的可解析音源"
        )));
    }
    Ok(order)
}

/// 一次解析的输入。
#[derive(Debug, Clone)]
pub struct ResolveInput<'r> {
    /// 平台。
    pub platform: Platform,
    /// 平台上的歌曲 ID。
    pub external_id: &'r str,
    /// 请求的音质，未指定时使用配置。
    pub quality: Option<u32>,
    /// 用户 Cookie。
    pub cookie: Option<&'r str>,
    /// 附加选项。
    pub options: &'r ResolveOptions,
}

/// 链接解析器，借用引擎的注册表、音源实现与状态。
pub struct UrlResolver<'a> {
    config: &'a EngineConfig,
    registry: &'a SourceRegistry,
    providers: &'a ProviderSet,
    health: &'a HealthTracker,
    validator: &'a LinkValidator,
}

impl<'a> UrlResolver<'a> {
    /// 创建解析器。
    pub fn new(
        config: &'a EngineConfig,
        registry: &'a SourceRegistry,
        providers: &'a ProviderSet,
        health: &'a HealthTracker,
        validator: &'a LinkValidator,
    ) -> Self {
        Self {
            config,
            registry,
            providers,
            health,
            validator,
        }
    }

    /// 播客默认不解灰，除非调用方显式要求。
    fn unblock_for(&self, platform: Platform, options: &ResolveOptions) -> bool {
        options.unblock.unwrap_or(if platform.is_podcast() {
            false
        } else {
            self.config.unblock_default
        })
    }

    /// 解析一首歌的播放链接。
    pub async fn resolve(&self, input: &ResolveInput<'_>) -> Result<ResolvedUrl> {
        let order = resolve_try_order(
            self.registry,
            self.providers,
            input.platform,
            input.options.preferred_source.as_deref(),
        )?;
        let request = ResolveRequest {
            platform: input.platform,
            external_id: input.external_id,
            quality: input
                .quality
                .unwrap_or_else(|| self.config.quality.for_platform(input.platform)),
            cookie: input.cookie,
            unblock: self.unblock_for(input.platform, input.options),
            bilibili_cid: input.options.bilibili_cid.as_deref(),
        };

        info!(
            "[Resolve] 解析 {} {} (音质 {}, 解灰 {}), 共 {} 个候选音源",
            request.platform,
            request.external_id,
            request.quality,
            request.unblock,
            order.len()
        );

        let mut attempts = Vec::new();
        for source in order {
            let started = Instant::now();
            match self.attempt(source, &request).await {
                Ok(resolved) => {
                    self.health.record_success(&source.id, started.elapsed());
                    info!("[Resolve] 音源 {} 给出可用链接", source.id);
                    return Ok(resolved);
                }
                Err(e) => {
                    warn!("[Resolve] 音源 {} 解析失败: {}", source.id, e);
                    self.health
                        .record_failure(&source.id, e.to_string(), started.elapsed());
                    attempts.push(AttemptError::new(&source.id, e));
                }
            }
        }

        Err(EngineError::AllSourcesExhausted { attempts })
    }

    async fn attempt(&self, source: &MusicSource, request: &ResolveRequest<'_>) -> Result<ResolvedUrl> {
        let provider = self.providers.for_source(source)?;
        debug!("[Resolve] 尝试音源 {}", source.id);

        let raw = provider.resolve(source, request).await?;
        let url = upgrade_to_https(&raw);
        let validation = self.validator.validate(&url, &source.headers).await;
        if !validation.valid {
            return Err(EngineError::ValidationFailed(
                validation.error.unwrap_or_else(|| "未知原因".into()),
            ));
        }

        Ok(ResolvedUrl {
            url,
            source_id: source.id.clone(),
            estimated_duration_sec: validation.estimated_duration_sec,
        })
    }
}
