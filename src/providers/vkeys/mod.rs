//! vkeys 聚合接口的两代实现。
//!
//! v2 同时支持网易云与 QQ 音乐，能直接给出播放链接；
//! v3 只支持 QQ 音乐，只给出各档音质的信息，链接仍需通过 v2 获取。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::{DEFAULT_TENCENT_QUALITY, MusicSource},
    error::{EngineError, Result},
    http::{HttpRequest, HttpTransport},
    model::track::{LyricsData, Platform, SearchParams, Track},
    normalize::{self, Payload},
    providers::{ProviderFamily, ResolveRequest, SourceProvider, expect_code, get_json},
    resolve::quality::QualitySelection,
};

pub mod models;

fn platform_segment(source_id: &str, platform: Platform) -> Result<&'static str> {
    match platform {
        Platform::Netease | Platform::NeteasePodcast => Ok("netease"),
        Platform::Tencent => Ok("tencent"),
        Platform::Bilibili => Err(EngineError::Configuration(format!(
            "音源 `{source_id}` 不支持哔哩哔哩"
        ))),
    }
}

/// QQ 音乐的 mid 不是纯数字，需要用 `mid` 参数传递。
fn id_param(platform: Platform, external_id: &str) -> &'static str {
    if platform == Platform::Tencent && !external_id.chars().all(|c| c.is_ascii_digit()) {
        "mid"
    } else {
        "id"
    }
}

/// 调用 v2 的链接接口。
async fn fetch_v2_url(
    transport: &dyn HttpTransport,
    source: &MusicSource,
    platform: Platform,
    external_id: &str,
    quality: u32,
) -> Result<String> {
    let segment = platform_segment(&source.id, platform)?;
    let body = get_json(
        transport,
        source,
        HttpRequest::get(source.endpoint(&format!("/{segment}")))
            .query(id_param(platform, external_id), external_id)
            .query("quality", quality),
    )
    .await?;
    models::url_from_v2(&source.id, &body)
}

fn lyric_text(data: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

/// vkeys 第二代接口。
pub struct VkeysV2 {
    transport: Arc<dyn HttpTransport>,
}

impl VkeysV2 {
    /// 创建实例。
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// 获取歌词。QQ 音乐的逐字歌词 (QRC) 放在 `yrc` 中。
    pub async fn lyric(&self, source: &MusicSource, platform: Platform, id: &str) -> Result<LyricsData> {
        let segment = platform_segment(&source.id, platform)?;
        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint(&format!("/{segment}/lyric")))
                .query(id_param(platform, id), id),
        )
        .await?;
        expect_code(&source.id, &body, models::V2_SUCCESS)?;

        let data = body.get("data").cloned().unwrap_or(Value::Null);
        Ok(LyricsData {
            lrc: lyric_text(&data, &["lrc", "lyric"]),
            trans: lyric_text(&data, &["trans", "tlyric"]),
            yrc: lyric_text(&data, &["yrc", "qrc"]),
            ttml: String::new(),
        })
    }
}

#[async_trait]
impl SourceProvider for VkeysV2 {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::VkeysV2
    }

    async fn search(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        let platform = match params.platform {
            Platform::Tencent => Platform::Tencent,
            _ => Platform::Netease,
        };
        let segment = platform_segment(&source.id, platform)?;
        debug!("[vkeys] v2 在 {} 搜索 '{}'", segment, params.keywords);

        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint(&format!("/{segment}")))
                .query("word", &params.keywords)
                .query("page", params.page())
                .query("num", params.limit),
        )
        .await?;
        normalize::normalize(&source.id, Payload::VkeysV2(platform), &body)
    }

    async fn resolve(&self, source: &MusicSource, request: &ResolveRequest<'_>) -> Result<String> {
        debug!(
            "[vkeys] v2 解析 {} {} (quality={})",
            request.platform, request.external_id, request.quality
        );
        fetch_v2_url(
            self.transport.as_ref(),
            source,
            request.platform,
            request.external_id,
            request.quality,
        )
        .await
    }

    fn supports_resolve(&self, platform: Platform) -> bool {
        platform != Platform::Bilibili
    }
}

/// vkeys 第三代接口（仅 QQ 音乐）。
pub struct VkeysV3 {
    transport: Arc<dyn HttpTransport>,
    /// 获取链接时借用的 v2 音源配置。
    v2_source: Option<MusicSource>,
}

impl VkeysV3 {
    /// 创建实例。`v2_source` 为取链接时使用的 v2 音源配置。
    pub fn new(transport: Arc<dyn HttpTransport>, v2_source: Option<MusicSource>) -> Self {
        Self {
            transport,
            v2_source,
        }
    }

    /// 获取歌曲的音质信息并完成协商。
    pub async fn negotiate(
        &self,
        source: &MusicSource,
        mid: &str,
        requested: Option<u32>,
    ) -> Result<QualitySelection> {
        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint("/tencent/song/info")).query("mid", mid),
        )
        .await?;
        let tiers = models::quality_tiers(&source.id, &body)?;
        Ok(QualitySelection::negotiate(requested, DEFAULT_TENCENT_QUALITY, tiers))
    }
}

#[async_trait]
impl SourceProvider for VkeysV3 {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::VkeysV3
    }

    async fn search(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        debug!("[vkeys] v3 搜索 '{}'", params.keywords);
        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint("/tencent/search/song"))
                .query("keyword", &params.keywords)
                .query("page", params.page())
                .query("num", params.limit),
        )
        .await?;
        normalize::normalize(&source.id, Payload::VkeysV3, &body)
    }

    async fn resolve(&self, source: &MusicSource, request: &ResolveRequest<'_>) -> Result<String> {
        let v2_source = self.v2_source.as_ref().ok_or_else(|| {
            EngineError::Configuration("vkeys-v3 取链接依赖 vkeys-v2 的配置".into())
        })?;

        let selection = self
            .negotiate(source, request.external_id, Some(request.quality))
            .await?;
        if selection.candidates.is_empty() {
            return Err(EngineError::upstream(&source.id, "没有任何可用的音质"));
        }
        debug!(
            "[vkeys] v3 协商结果 {}: 请求 {}, 候选 {:?}",
            request.external_id, request.quality, selection.candidates
        );

        let mut last_error = None;
        for tier in &selection.candidates {
            match fetch_v2_url(
                self.transport.as_ref(),
                v2_source,
                Platform::Tencent,
                request.external_id,
                *tier,
            )
            .await
            {
                Ok(url) => {
                    info!("[vkeys] v3 以音质 {} 取得 {} 的链接", tier, request.external_id);
                    return Ok(url);
                }
                Err(e) => {
                    warn!("[vkeys] v3 音质 {} 取链接失败: {}", tier, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::upstream(&source.id, "所有音质均无法取得链接")))
    }

    fn supports_resolve(&self, platform: Platform) -> bool {
        platform == Platform::Tencent
    }
}
