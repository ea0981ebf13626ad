//! 此模块实现了与自建网易云兼容后端交互的音源。
//! API 来源于 https://github.com/NeteaseCloudMusicApiReborn/api

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    config::MusicSource,
    error::{EngineError, Result},
    http::{HttpRequest, HttpTransport},
    model::track::{LyricsData, Platform, SearchParams, SearchType, Track},
    normalize::{self, Payload},
    providers::{ProviderFamily, ResolveRequest, SourceProvider, get_json, send},
};

mod crypto;
pub mod models;

/// 播客搜索时最多展开的电台数量。
const MAX_RADIOS: usize = 3;

/// 将数值音质映射为网易云的音质等级名。
pub fn level_for_quality(quality: u32) -> &'static str {
    match quality {
        1 => "standard",
        2 => "higher",
        3 => "exhigh",
        4 => "lossless",
        5 => "hires",
        q if q >= 6 => "jymaster",
        _ => "exhigh",
    }
}

/// 自建网易云兼容后端的实现。
pub struct NeteaseCompatible {
    transport: Arc<dyn HttpTransport>,
}

impl NeteaseCompatible {
    /// 创建实例。
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn search_request(source: &MusicSource, path: &str, params: &SearchParams) -> HttpRequest {
        HttpRequest::get(source.endpoint(path))
            .query("keywords", &params.keywords)
            .query("limit", params.limit)
            .query("offset", params.offset)
            .query("type", params.search_type.code())
            .query_opt("cookie", params.cookie.as_deref())
    }

    /// 云搜索，失败时改用普通搜索再试一次。
    async fn search_songs(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        let cloud = async {
            let body = get_json(
                self.transport.as_ref(),
                source,
                Self::search_request(source, "/cloudsearch", params),
            )
            .await?;
            normalize::normalize(&source.id, Payload::NeteaseCloudSearch, &body)
        }
        .await;

        match cloud {
            Ok(tracks) => Ok(tracks),
            Err(e) => {
                warn!("[NetEase] {} 云搜索失败，改用普通搜索: {}", source.id, e);
                self.search_plain(source, params).await
            }
        }
    }

    /// 普通搜索，并通过详情接口补齐封面。
    async fn search_plain(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        let body = get_json(
            self.transport.as_ref(),
            source,
            Self::search_request(source, "/search", params),
        )
        .await?;
        let mut tracks = normalize::normalize(&source.id, Payload::NeteaseSearch, &body)?;
        if tracks.is_empty() {
            return Ok(tracks);
        }

        let ids = tracks
            .iter()
            .map(|t| t.external_id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let detail = async {
            let body = get_json(
                self.transport.as_ref(),
                source,
                HttpRequest::get(source.endpoint("/song/detail")).query("ids", ids),
            )
            .await?;
            models::detail_covers(&source.id, &body)
        }
        .await;

        // 详情接口失败不影响结果，保留由 picId 推导出的封面
        match detail {
            Ok(covers) => {
                let covers: HashMap<String, String> = covers.into_iter().collect();
                for track in &mut tracks {
                    if let Some(cover) = covers.get(&track.external_id) {
                        track.cover = Some(cover.clone());
                    }
                }
            }
            Err(e) => warn!("[NetEase] {} 批量获取歌曲详情失败: {}", source.id, e),
        }
        Ok(tracks)
    }

    /// 搜索电台，再展开前几个电台的节目。
    async fn search_programs(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        let radios = match self.radio_ids(source, "/cloudsearch", params).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("[NetEase] {} 电台云搜索失败，改用普通搜索: {}", source.id, e);
                self.radio_ids(source, "/search", params).await?
            }
        };

        let mut tracks = Vec::new();
        let mut last_error = None;
        for rid in radios.iter().take(MAX_RADIOS) {
            let result = async {
                let body = get_json(
                    self.transport.as_ref(),
                    source,
                    HttpRequest::get(source.endpoint("/dj/program"))
                        .query("rid", rid)
                        .query("limit", params.limit),
                )
                .await?;
                normalize::normalize(&source.id, Payload::NeteasePrograms, &body)
            }
            .await;

            match result {
                Ok(programs) => tracks.extend(programs),
                Err(e) => {
                    warn!("[NetEase] {} 获取电台 {} 的节目失败: {}", source.id, rid, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if tracks.is_empty() => Err(e),
            _ => {
                tracks.truncate(params.limit as usize);
                Ok(tracks)
            }
        }
    }

    async fn radio_ids(
        &self,
        source: &MusicSource,
        path: &str,
        params: &SearchParams,
    ) -> Result<Vec<String>> {
        let body = get_json(
            self.transport.as_ref(),
            source,
            Self::search_request(source, path, params),
        )
        .await?;
        models::radio_ids(&source.id, &body)
    }

    async fn lyric_endpoint(&self, source: &MusicSource, path: &str, id: &str) -> Result<LyricsData> {
        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint(path)).query("id", id),
        )
        .await?;
        let resp: models::LyricResult = serde_json::from_value(body)
            .map_err(|e| EngineError::normalization(&source.id, e.to_string()))?;
        if resp.code != 200 {
            return Err(EngineError::upstream(
                &source.id,
                format!("网易云歌词接口返回码 {}", resp.code),
            ));
        }
        Ok(LyricsData {
            lrc: models::LyricResult::text(&resp.lrc),
            trans: models::LyricResult::text(&resp.tlyric),
            yrc: models::LyricResult::text(&resp.yrc),
            ttml: String::new(),
        })
    }

    /// 新版歌词接口，带逐字歌词。
    pub async fn lyric_new(&self, source: &MusicSource, id: &str) -> Result<LyricsData> {
        self.lyric_endpoint(source, "/lyric/new", id).await
    }

    /// 旧版歌词接口，只有 LRC 与翻译。
    pub async fn lyric(&self, source: &MusicSource, id: &str) -> Result<LyricsData> {
        self.lyric_endpoint(source, "/lyric", id).await
    }

    /// TTML 歌词接口，正文即为 TTML 文本。没有歌词时返回空字符串。
    pub async fn lyric_ttml(&self, source: &MusicSource, id: &str) -> Result<String> {
        let response = send(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint("/lyric/ttml")).query("id", id),
        )
        .await?;
        let text = response.body.trim();
        if text.starts_with('<') {
            Ok(text.to_string())
        } else {
            Ok(String::new())
        }
    }
}

#[async_trait]
impl SourceProvider for NeteaseCompatible {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::NeteaseCompatible
    }

    async fn search(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>> {
        debug!(
            "[NetEase] {} 搜索 '{}' (type={})",
            source.id,
            params.keywords,
            params.search_type.code()
        );
        match params.search_type {
            SearchType::Podcast => self.search_programs(source, params).await,
            SearchType::Song => self.search_songs(source, params).await,
        }
    }

    async fn resolve(&self, source: &MusicSource, request: &ResolveRequest<'_>) -> Result<String> {
        let level = level_for_quality(request.quality);
        debug!(
            "[NetEase] {} 解析 {} (level={}, unblock={})",
            source.id, request.external_id, level, request.unblock
        );

        let body = get_json(
            self.transport.as_ref(),
            source,
            HttpRequest::get(source.endpoint("/song/url/v1"))
                .query("id", request.external_id)
                .query("level", level)
                .query("unblock", request.unblock)
                .query_opt("cookie", request.cookie),
        )
        .await?;

        let resp: models::SongUrlResult = serde_json::from_value(body)
            .map_err(|e| EngineError::normalization(&source.id, e.to_string()))?;
        if resp.code != 200 {
            return Err(EngineError::upstream(
                &source.id,
                format!("播放链接接口返回码 {}", resp.code),
            ));
        }

        resp.data
            .into_iter()
            .find_map(|d| d.url.filter(|u| !u.is_empty()))
            .ok_or_else(|| EngineError::upstream(&source.id, "没有可用的播放链接，可能因 VIP 或版权问题"))
    }

    fn supports_resolve(&self, platform: Platform) -> bool {
        matches!(platform, Platform::Netease | Platform::NeteasePodcast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeTransport, init_tracing, source};
    use serde_json::{Value, json};

    fn cloud_body() -> Value {
        json!({
            "code": 200,
            "result": {"songs": [{
                "id": 186001, "name": "稻香", "ar": [{"name": "周杰伦"}],
                "al": {"name": "魔杰座", "picUrl": "http://p2.music.126.net/a.jpg"}, "dt": 223000
            }]}
        })
    }

    #[test]
    fn level_mapping() {
        assert_eq!(level_for_quality(1), "standard");
        assert_eq!(level_for_quality(4), "lossless");
        assert_eq!(level_for_quality(5), "hires");
        assert_eq!(level_for_quality(9), "jymaster");
        assert_eq!(level_for_quality(0), "exhigh");
    }

    #[tokio::test]
    async fn cloud_search_is_used_first() {
        init_tracing();
        let transport = FakeTransport::new();
        transport.on_json("/cloudsearch", cloud_body());
        let provider = NeteaseCompatible::new(transport.clone());

        let tracks = provider
            .search(&source("netease-backup-1"), &SearchParams::new("稻香", Platform::Netease))
            .await
            .unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(transport.count(), 1);
        assert!(transport.urls()[0].contains("keywords=稻香"));
    }

    #[tokio::test]
    async fn falls_back_to_plain_search_and_fills_covers() {
        init_tracing();
        let transport = FakeTransport::new();
        transport.fail("/cloudsearch");
        transport.on_json(
            "/search",
            json!({"code": 200, "result": {"songs": [{
                "id": 186001, "name": "稻香", "artists": [{"name": "周杰伦"}],
                "album": {"name": "魔杰座", "picId": 1}, "duration": 223000
            }]}}),
        );
        transport.on_json(
            "/song/detail",
            json!({"code": 200, "songs": [{"id": 186001, "al": {"picUrl": "http://p1/real.jpg"}}]}),
        );
        let provider = NeteaseCompatible::new(transport.clone());

        let tracks = provider
            .search(&source("netease-backup-1"), &SearchParams::new("稻香", Platform::Netease))
            .await
            .unwrap();

        assert_eq!(tracks[0].cover.as_deref(), Some("http://p1/real.jpg"));
        let urls = transport.urls();
        assert!(urls[1].contains("/search?"));
        assert!(urls[2].contains("ids=186001"));
    }

    #[tokio::test]
    async fn podcast_search_expands_radios() {
        let transport = FakeTransport::new();
        transport.on_json(
            "/cloudsearch",
            json!({"code": 200, "result": {"djRadios": [{"id": 11}, {"id": 12}]}}),
        );
        transport.on_json(
            "/dj/program?rid=11",
            json!({"code": 200, "programs": [{
                "id": 1, "name": "第一期", "mainSong": {"id": 901, "duration": 1000},
                "dj": {"nickname": "主播"}, "radio": {"name": "电台"}
            }]}),
        );
        transport.on_json("/dj/program?rid=12", json!({"code": 200, "programs": []}));
        let provider = NeteaseCompatible::new(transport.clone());

        let params = SearchParams::new("晚安", Platform::Netease).podcast();
        let tracks = provider.search(&source("netease-backup-1"), &params).await.unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].platform, Platform::NeteasePodcast);
        assert!(transport.urls()[0].contains("type=1009"));
    }

    #[tokio::test]
    async fn resolve_passes_level_and_unblock() {
        let transport = FakeTransport::new();
        transport.on_json(
            "/song/url/v1",
            json!({"code": 200, "data": [{"url": "http://m801.music.126.net/a.flac", "code": 200}]}),
        );
        let provider = NeteaseCompatible::new(transport.clone());
        let request = ResolveRequest {
            platform: Platform::NeteasePodcast,
            external_id: "186001",
            quality: 5,
            cookie: None,
            unblock: false,
            bilibili_cid: None,
        };

        let url = provider.resolve(&source("netease-backup-1"), &request).await.unwrap();

        assert_eq!(url, "http://m801.music.126.net/a.flac");
        let sent = &transport.requests()[0];
        assert_eq!(sent.query_value("level"), Some("hires"));
        assert_eq!(sent.query_value("unblock"), Some("false"));
    }

    #[tokio::test]
    async fn resolve_without_url_fails() {
        let transport = FakeTransport::new();
        transport.on_json("/song/url/v1", json!({"code": 200, "data": [{"url": null, "code": 404}]}));
        let provider = NeteaseCompatible::new(transport);
        let request = ResolveRequest {
            platform: Platform::Netease,
            external_id: "1",
            quality: 4,
            cookie: None,
            unblock: true,
            bilibili_cid: None,
        };

        let err = provider.resolve(&source("netease-backup-1"), &request).await.unwrap_err();
        assert!(matches!(err, EngineError::Upstream { .. }));
    }

    #[tokio::test]
    async fn lyric_new_reads_all_slots() {
        let transport = FakeTransport::new();
        transport.on_json(
            "/lyric/new",
            json!({"code": 200, "lrc": {"lyric": "[00:01.00]还记得"}, "tlyric": {"lyric": ""}, "yrc": {"lyric": "[1000,2000](1000,500,0)还"}}),
        );
        let provider = NeteaseCompatible::new(transport);

        let data = provider.lyric_new(&source("netease-backup-1"), "186001").await.unwrap();
        assert_eq!(data.lrc, "[00:01.00]还记得");
        assert!(data.trans.is_empty());
        assert!(!data.yrc.is_empty());
    }
}
