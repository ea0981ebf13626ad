//! 哔哩哔哩音频提取服务。
//!
//! 视频的一个分 P 对应一首歌，ID 形如 `BV1xx411c7mD_123456` 或 `BV1xx411c7mD:123456`，
//! 分隔符之后的部分是分 P 的 cid。

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{
    config::MusicSource,
    error::{EngineError, Result},
    http::{HttpRequest, HttpTransport},
    model::track::{Platform, SearchParams, Track},
    normalize::{self, Payload},
    providers::{
        ProviderFamily, ResolveRequest, SourceProvider, expect_code, get_json, secs_to_ms,
        value_as_i64, value_as_id,
    },
};

/// 搜索结果标题中的高亮标签。
static HIGHLIGHT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?em[^>]*>").unwrap());

/// 搜索项。
#[derive(Debug, Deserialize)]
pub struct BilibiliItem {
    /// 视频 BV 号。
    pub bvid: Option<String>,
    /// 分 P 的 cid。
    pub cid: Option<Value>,
    /// 标题，可能带有 `<em>` 高亮。
    pub title: Option<String>,
    /// UP 主。
    pub author: Option<String>,
    /// 封面。
    pub pic: Option<String>,
    /// 时长，`mm:ss` 字符串或秒数。
    pub duration: Option<Value>,
}

/// 将 ID 拆分为 BV 号与 cid。
pub fn split_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once(['_', ':']) {
        Some((bvid, cid)) if !cid.is_empty() => (bvid, Some(cid)),
        Some((bvid, _)) => (bvid, None),
        None => (id, None),
    }
}

fn strip_highlight(title: &str) -> String {
    HIGHLIGHT_REGEX.replace_all(title, "").trim().to_string()
}

fn parse_duration(value: &Value) -> u64 {
    if let Some(secs) = value.as_u64() {
        return secs_to_ms(secs);
    }
    let Some(text) = value.as_str() else {
        return 0;
    };
    text.split(':')
        .try_fold(0u64, |acc, part| {
            let n = part.trim().parse::<u64>().ok()?;
            acc.checked_mul(60)?.checked_add(n)
        })
        .map_or(0, secs_to_ms)
}

/// 映射搜索响应。
pub fn normalize_search(provider_id: &str, body: &Value) -> Result<Vec<Track>> {
    expect_code(provider_id, body, 0)?;
    let items = body
        .pointer("/data/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    items
        .into_iter()
        .map(|raw| {
            let item: BilibiliItem = serde_json::from_value(raw)
                .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;
            let bvid = item
                .bvid
                .filter(|b| !b.is_empty())
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `bvid`"))?;
            let title = item
                .title
                .map(|t| strip_highlight(&t))
                .filter(|t| !t.is_empty())
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `title`"))?;
            let artist = item
                .author
                .filter(|a| !a.is_empty())
                .ok_or_else(|| EngineError::normalization(provider_id, "缺少必需字段 `author`"))?;

            let cid = item.cid.as_ref().and_then(value_as_id);
            let external_id = match &cid {
                Some(cid) => format!("{bvid}_{cid}"),
                None => bvid.clone(),
            };

            let mut track = Track::new(Platform::Bilibili, external_id, title, artist, provider_id)
                .with_hint("bvid", bvid);
            if let Some(cid) = cid {
                track = track.with_hint("cid", cid);
            }
            track.cover = item.pic.filter(|p| !p.is_empty()).map(|p| {
                if p.starts_with("//") {
                    format!("https:{p}")
                } else {
                    p
                }
            });
            track.duration_ms = item.duration.as_ref().map(parse_duration).unwrap_or(0);
            Ok(track)
        })
        .collect()
}

/// 哔哩哔哩音频提取服务的实现。
pub struct BilibiliExtractor {
    transport: Arc<dyn HttpTransport>,
}

impl BilibiliExtractor {
    /// 创建实例。
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SourceProvider for BilibiliExtractor {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Bilibili
    }

    async fn search(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        debug!("[Bilibili] 搜索 '{}'", params.keywords);
        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint("/search"))
                .query("keyword", &params.keywords)
                .query("page", params.page())
                .query("pageSize", params.limit),
        )
        .await?;
        normalize::normalize(&source.id, Payload::Bilibili, &body)
    }

    async fn resolve(&self, source: &MusicSource, request: &ResolveRequest<'_>) -> Result<String> {
        let (bvid, parsed_cid) = split_id(request.external_id);
        let cid = request.bilibili_cid.or(parsed_cid);
        debug!("[Bilibili] 解析 {} (cid={:?})", bvid, cid);

        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint("/playurl"))
                .query("bvid", bvid)
                .query_opt("cid", cid),
        )
        .await?;
        expect_code(&source.id, &body, 0)?;

        body.pointer("/data/url")
            .or_else(|| body.pointer("/data/durl/0/url"))
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                let code = body.get("code").and_then(value_as_i64).unwrap_or_default();
                EngineError::upstream(&source.id, format!("没有音频链接 (code {code})"))
            })
    }

    fn supports_resolve(&self, platform: Platform) -> bool {
        platform == Platform::Bilibili
    }
}
