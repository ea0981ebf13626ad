//! 歌词模块
//!
//! 与链接解析相同的回退思路，但各歌词来源的格式互补而非互斥，
//! 因此结果是逐步合并的：先到的内容保留，后到的只补空缺。
//!
//! 两种组合方式以具名策略表达：[`sequential`] 逐个尝试，[`race_all`] 并发尝试。

use futures::{
    StreamExt,
    future::{self, BoxFuture},
    stream::FuturesUnordered,
};
use tracing::{debug, info, warn};

use crate::{
    config::{EngineConfig, LyricStrategy, SourceRegistry},
    model::track::{LyricsData, LyricsResponse, Platform},
    providers::{ProviderFamily, ProviderSet},
};

pub mod amll;

use amll::TtmlDatabase;

/// 一个歌词来源的调用，失败已在内部记录并转为空结果。
pub type LyricTask<'a> = BoxFuture<'a, LyricsData>;

/// 逐个执行，合并结果，`done` 满足时不再继续。
pub async fn sequential<'a>(
    tasks: Vec<LyricTask<'a>>,
    done: impl Fn(&LyricsData) -> bool,
) -> LyricsData {
    let mut merged = LyricsData::default();
    for task in tasks {
        merged.fill_from(task.await);
        if done(&merged) {
            break;
        }
    }
    merged
}

/// 并发执行，按完成顺序合并结果，`pick` 满足时立即返回，不再等待其余任务。
pub async fn race_all<'a>(
    tasks: Vec<LyricTask<'a>>,
    pick: impl Fn(&LyricsData) -> bool,
) -> LyricsData {
    let mut pending: FuturesUnordered<_> = tasks.into_iter().collect();
    let mut merged = LyricsData::default();
    while let Some(data) = pending.next().await {
        merged.fill_from(data);
        if pick(&merged) {
            break;
        }
    }
    merged
}

fn has_text(data: &LyricsData) -> bool {
    !data.is_empty()
}

/// 歌词解析器，借用引擎的配置与音源实现。
pub struct LyricsResolver<'a> {
    config: &'a EngineConfig,
    registry: &'a SourceRegistry,
    providers: &'a ProviderSet,
    ttml_db: &'a TtmlDatabase,
}

impl<'a> LyricsResolver<'a> {
    /// 创建解析器。
    pub fn new(
        config: &'a EngineConfig,
        registry: &'a SourceRegistry,
        providers: &'a ProviderSet,
        ttml_db: &'a TtmlDatabase,
    ) -> Self {
        Self {
            config,
            registry,
            providers,
            ttml_db,
        }
    }

    /// 按配置的策略获取歌词。
    pub async fn get_lyrics(&self, platform: Platform, id: &str) -> LyricsResponse {
        if platform == Platform::Bilibili {
            return LyricsResponse {
                success: false,
                data: None,
                error: Some("哔哩哔哩音频没有歌词".into()),
            };
        }

        let strategy = self.config.lyric_strategy;
        info!("[Lyrics] 获取 {} {} 的歌词 (策略: {})", platform, id, strategy);

        let mut data = match strategy {
            LyricStrategy::Qm => {
                sequential(
                    vec![self.qm(platform, id), self.ttml(platform, id), self.official(platform, id)],
                    has_text,
                )
                .await
            }
            LyricStrategy::Ttml => {
                sequential(
                    vec![self.ttml(platform, id), self.official(platform, id), self.qm(platform, id)],
                    has_text,
                )
                .await
            }
            LyricStrategy::Official => {
                sequential(
                    vec![self.official(platform, id), self.ttml(platform, id), self.qm(platform, id)],
                    has_text,
                )
                .await
            }
            LyricStrategy::Auto => {
                let pair: LyricTask<'_> = Box::pin(async move {
                    let (mut ttml, official) =
                        future::join(self.ttml(platform, id), self.official(platform, id)).await;
                    ttml.fill_from(official);
                    ttml
                });
                race_all(vec![self.qm(platform, id), pair], LyricsData::has_ttml).await
            }
        };

        if data.is_empty() {
            debug!("[Lyrics] 尝试 Meting 兜底");
            data.fill_from(self.meting(platform, id).await);
        }

        if data.is_empty() {
            warn!("[Lyrics] 所有来源都没有 {} 的歌词", id);
            LyricsResponse {
                success: false,
                data: None,
                error: Some("未找到歌词".into()),
            }
        } else {
            LyricsResponse {
                success: true,
                data: Some(data),
                error: None,
            }
        }
    }

    /// vkeys 的歌词接口（QQ 音乐为逐字 QRC）。
    fn qm<'f>(&'f self, platform: Platform, id: &'f str) -> LyricTask<'f> {
        let source = self.registry.enabled_by_id("vkeys-v2");
        let provider = self.providers.vkeys_v2();
        Box::pin(async move {
            let Some(source) = source else {
                return LyricsData::default();
            };
            provider
                .lyric(source, platform, id)
                .await
                .unwrap_or_else(|e| {
                    warn!("[Lyrics] vkeys 歌词获取失败: {}", e);
                    LyricsData::default()
                })
        })
    }

    /// TTML：先查社区歌词库，网易云歌曲再查备用音源的 TTML 接口。
    fn ttml<'f>(&'f self, platform: Platform, id: &'f str) -> LyricTask<'f> {
        let ttml_db = self.ttml_db;
        let backups: Vec<_> = if platform == Platform::Tencent {
            Vec::new()
        } else {
            self.registry
                .enabled_of_family(ProviderFamily::NeteaseCompatible)
                .collect()
        };
        let provider = self.providers.netease();
        Box::pin(async move {
            match ttml_db.fetch(platform, id).await {
                Ok(ttml) if !ttml.is_empty() => {
                    return LyricsData {
                        ttml,
                        ..Default::default()
                    };
                }
                Ok(_) => debug!("[Lyrics] 歌词库中没有 {}", id),
                Err(e) => warn!("[Lyrics] 歌词库请求失败: {}", e),
            }
            for source in backups {
                match provider.lyric_ttml(source, id).await {
                    Ok(ttml) if !ttml.is_empty() => {
                        return LyricsData {
                            ttml,
                            ..Default::default()
                        };
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[Lyrics] {} 的 TTML 接口失败: {}", source.id, e),
                }
            }
            LyricsData::default()
        })
    }

    /// 网易云官方歌词：新版接口优先，旧版接口兜底。
    fn official<'f>(&'f self, platform: Platform, id: &'f str) -> LyricTask<'f> {
        let backups: Vec<_> = if platform == Platform::Tencent {
            Vec::new()
        } else {
            self.registry
                .enabled_of_family(ProviderFamily::NeteaseCompatible)
                .collect()
        };
        let provider = self.providers.netease();
        Box::pin(async move {
            for source in backups {
                match provider.lyric_new(source, id).await {
                    Ok(data) if !data.is_empty() => return data,
                    Ok(_) => {}
                    Err(e) => warn!("[Lyrics] {} 的新版歌词接口失败: {}", source.id, e),
                }
                match provider.lyric(source, id).await {
                    Ok(data) if !data.is_empty() => return data,
                    Ok(_) => {}
                    Err(e) => warn!("[Lyrics] {} 的歌词接口失败: {}", source.id, e),
                }
            }
            LyricsData::default()
        })
    }

    /// Meting 纯 LRC，最后的兜底。
    async fn meting(&self, platform: Platform, id: &str) -> LyricsData {
        if platform == Platform::Tencent {
            return LyricsData::default();
        }
        for source in self.registry.enabled_of_family(ProviderFamily::Meting) {
            match self.providers.meting().lrc(source, id).await {
                Ok(lrc) if !lrc.trim().is_empty() => {
                    return LyricsData {
                        lrc,
                        ..Default::default()
                    };
                }
                Ok(_) => {}
                Err(e) => warn!("[Lyrics] {} 的歌词获取失败: {}", source.id, e),
            }
        }
        LyricsData::default()
    }
}
