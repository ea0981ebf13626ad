//! Meting 代理。
//!
//! 所有接口都挂在同一个地址上，以 `server`、`type`、`id` 三个查询参数区分。
//! 这里只使用 `server=netease`。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    config::MusicSource,
    error::{EngineError, Result},
    http::{HttpRequest, HttpTransport},
    model::track::{Platform, SearchParams, Track},
    normalize::{self, Payload},
    providers::{ProviderFamily, ResolveRequest, SourceProvider, get_json, send, value_as_id},
};

const SERVER: &str = "netease";

fn request(source: &MusicSource, kind: &str, id: &str) -> HttpRequest {
    HttpRequest::get(source.base_url.clone())
        .query("server", SERVER)
        .query("type", kind)
        .query("id", id)
}

/// Meting 的返回既可能是数组也可能是单个对象。
fn entries(body: &Value) -> Vec<&Value> {
    match body {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![body],
        _ => Vec::new(),
    }
}

/// 从 Meting 自身的 `type=url&id=...` 链接中取出歌曲 ID。
fn id_from_meting_url(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("id="))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn text_field(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 映射搜索响应。
pub fn normalize_search(provider_id: &str, body: &Value) -> Result<Vec<Track>> {
    if !body.is_array() && !body.is_object() {
        return Err(EngineError::upstream(provider_id, "Meting 返回了非 JSON 列表"));
    }

    entries(body)
        .into_iter()
        .map(|entry| {
            let url = text_field(entry, &["url"]);
            let id = entry
                .get("id")
                .and_then(value_as_id)
                .or_else(|| url.as_deref().and_then(id_from_meting_url))
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `id`"))?;
            let title = text_field(entry, &["name", "title"])
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `name`"))?;
            let artist = text_field(entry, &["artist", "author"])
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `artist`"))?;

            let mut track = Track::new(Platform::Netease, id, title, artist, provider_id)
                .with_direct_url(url);
            track.cover = text_field(entry, &["pic", "cover"]);
            Ok(track)
        })
        .collect()
}

/// Meting 代理的实现。
pub struct MetingProxy {
    transport: Arc<dyn HttpTransport>,
}

impl MetingProxy {
    /// 创建实例。
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// 获取纯 LRC 歌词。没有歌词时返回空字符串。
    pub async fn lrc(&self, source: &MusicSource, id: &str) -> Result<String> {
        let response = send(self.transport.as_ref(), source, request(source, "lrc", id)).await?;
        let text = response.body.trim();
        // 部分部署会把 LRC 包在 JSON 字符串或对象里
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            let lyric = value
                .as_str()
                .map(str::to_string)
                .or_else(|| text_field(&value, &["lrc", "lyric"]))
                .unwrap_or_default();
            return Ok(lyric);
        }
        Ok(text.to_string())
    }

    /// 跟随 `type=url` 的重定向，取最终地址。
    async fn redirect_url(&self, source: &MusicSource, id: &str) -> Result<String> {
        let probe = HttpRequest::head(source.base_url.clone())
            .query("server", SERVER)
            .query("type", "url")
            .query("id", id);
        let response = send(self.transport.as_ref(), source, probe).await?;
        if response.final_url.is_empty() || response.final_url.starts_with(&source.base_url) {
            return Err(EngineError::upstream(&source.id, "直链接口没有发生重定向"));
        }
        Ok(response.final_url)
    }
}

#[async_trait]
impl SourceProvider for MetingProxy {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Meting
    }

    async fn search(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        debug!("[Meting] {} 搜索 '{}'", source.id, params.keywords);
        let body = get_json(
            self.transport.as_ref(),
            source,
            request(source, "search", &params.keywords),
        )
        .await?;
        let mut tracks = normalize::normalize(&source.id, Payload::Meting, &body)?;
        tracks.truncate(params.limit as usize);
        Ok(tracks)
    }

    async fn resolve(&self, source: &MusicSource, request_info: &ResolveRequest<'_>) -> Result<String> {
        let id = request_info.external_id;
        debug!("[Meting] {} 解析 {}", source.id, id);

        let song = get_json(self.transport.as_ref(), source, request(source, "song", id)).await;
        match song {
            Ok(body) => {
                let url = entries(&body)
                    .into_iter()
                    .find_map(|e| text_field(e, &["url"]));
                // 歌曲信息里的 url 通常也是 Meting 自身的跳转地址，同样需要跟随
                if let Some(url) = url.filter(|u| !u.starts_with(&source.base_url)) {
                    return Ok(url);
                }
            }
            Err(e) => warn!("[Meting] {} 获取歌曲信息失败，改用直链接口: {}", source.id, e),
        }

        self.redirect_url(source, id).await
    }

    fn supports_resolve(&self, platform: Platform) -> bool {
        matches!(platform, Platform::Netease | Platform::NeteasePodcast)
    }
}
