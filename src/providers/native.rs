//! 本地部署的原生搜索接口。
//!
//! 只在部署于中国大陆时使用，能搜索网易云 (`wy`) 与 QQ 音乐 (`tx`)，
//! 但不能解析播放链接，解析时需要交给其他音源。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::MusicSource,
    error::{EngineError, Result},
    http::{HttpRequest, HttpTransport},
    model::track::{Platform, SearchParams, Track},
    normalize::{self, Payload},
    providers::{
        ProviderFamily, ResolveRequest, SourceProvider, expect_code, get_json, value_as_i64,
        value_as_id,
    },
};

/// 平台在原生接口中的代号。
pub fn platform_code(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::Netease => Some("wy"),
        Platform::Tencent => Some("tx"),
        _ => None,
    }
}

fn text(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 艺术家可能是字符串、字符串数组或 `{name}` 对象数组。
fn artist_of(entry: &Value) -> Option<String> {
    let raw = entry.get("artist").or_else(|| entry.get("artists"))?;
    let artist = match raw {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|a| a.as_str().or_else(|| a.get("name").and_then(Value::as_str)))
                .collect::<Vec<_>>()
                .join(" / "),
        ),
        _ => None,
    };
    artist.filter(|s| !s.is_empty())
}

/// 映射原生接口的搜索响应。
pub fn normalize_search(provider_id: &str, platform: Platform, body: &Value) -> Result<Vec<Track>> {
    expect_code(provider_id, body, 200)?;
    let items = body.get("data").and_then(Value::as_array).cloned().unwrap_or_default();

    items
        .iter()
        .map(|entry| {
            let numeric_id = entry.get("id").and_then(value_as_id);
            let external_id = match platform {
                Platform::Tencent => text(entry, &["mid"]).or(numeric_id.clone()),
                _ => numeric_id.clone(),
            }
            .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `id`"))?;
            let title = text(entry, &["name", "title"])
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `name`"))?;
            let artist = artist_of(entry)
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `artist`"))?;

            let mut track = Track::new(platform, external_id, title, artist, provider_id);
            if let Some(id) = numeric_id {
                track = track.with_hint("id", id);
            }
            track.album = text(entry, &["album"]);
            track.cover = text(entry, &["cover", "pic"]);
            track.duration_ms = entry
                .get("duration")
                .and_then(value_as_i64)
                .and_then(|d| u64::try_from(d).ok())
                .unwrap_or(0);
            Ok(track)
        })
        .collect()
}

/// 原生搜索接口的实现。
pub struct NativeSearch {
    transport: Arc<dyn HttpTransport>,
}

impl NativeSearch {
    /// 创建实例。
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceProvider for NativeSearch {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Native
    }

    async fn search(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        let code = platform_code(params.platform).ok_or_else(|| {
            EngineError::Configuration(format!("原生接口不支持平台 {}", params.platform))
        })?;
        debug!("[Native] 在 {} 搜索 '{}'", code, params.keywords);

        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint(&format!("/api/native-api/search/{code}")))
                .query("keywords", &params.keywords)
                .query("limit", params.limit)
                .query("offset", params.offset),
        )
        .await?;
        normalize::normalize(&source.id, Payload::Native(params.platform), &body)
    }

    async fn resolve(&self, source: &MusicSource, _request: &ResolveRequest<'_>) -> Result<String> {
        Err(EngineError::Configuration(format!(
            "音源 `{}` 不能解析播放链接",
            source.id
        )))
    }

    fn supports_resolve(&self, _platform: Platform) -> bool {
        false
    }
}
