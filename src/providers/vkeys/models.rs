//! vkeys 两代接口的响应结构与映射。
//!
//! 两代接口的成功码不同：v2 为 `200`，v3 为 `0`。
//! 这一差异只在本文件内处理，调用方拿到的总是统一的 `Track`。

use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{EngineError, Result},
    model::track::{Platform, Track},
    providers::{expect_code, min_sec_to_ms, secs_to_ms, value_as_i64, value_as_id},
};

/// v2 的成功码。
pub const V2_SUCCESS: i64 = 200;
/// v3 的成功码。
pub const V3_SUCCESS: i64 = 0;

/// v3 封面地址模板中的前缀。
const TENCENT_COVER_PREFIX: &str = "https://y.gtimg.cn/music/photo_new/T002R300x300M000";

/// v2 QQ 音乐搜索项。
#[derive(Debug, Deserialize)]
pub struct V2TencentItem {
    /// 数字 ID。
    pub id: Option<Value>,
    /// 歌曲 mid。
    pub mid: Option<String>,
    /// 歌曲名。
    pub song: Option<String>,
    /// 歌手。
    pub singer: Option<String>,
    /// 专辑名。
    pub album: Option<String>,
    /// 封面。
    pub cover: Option<String>,
    /// 时长描述，如 `3分43秒` 或 `03:43`。
    pub interval: Option<String>,
    /// 音质码。
    pub quality: Option<Value>,
    /// 类型码。
    #[serde(rename = "type")]
    pub kind: Option<Value>,
    /// 附带的播放链接。
    pub url: Option<String>,
}

/// v2 网易云搜索项。
#[derive(Debug, Deserialize)]
pub struct V2NeteaseItem {
    /// 歌曲 ID。
    pub id: Option<Value>,
    /// 歌曲名。
    pub name: Option<String>,
    /// 歌手。
    pub artist: Option<String>,
    /// 专辑名。
    pub album: Option<String>,
    /// 封面。
    pub cover: Option<String>,
    /// 时长描述。
    pub interval: Option<String>,
    /// 附带的播放链接。
    pub url: Option<String>,
}

/// v3 搜索结果的数据部分。
#[derive(Debug, Deserialize)]
pub struct V3SearchData {
    /// 歌曲列表。
    #[serde(default)]
    pub list: Vec<V3Song>,
}

/// v3 搜索项。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V3Song {
    /// 歌曲 mid。
    pub mid: Option<String>,
    /// 数字 ID。
    pub id: Option<Value>,
    /// 歌曲名。
    pub title: Option<String>,
    /// 副标题。
    pub subtitle: Option<String>,
    /// 歌手列表。
    #[serde(default)]
    pub singer_list: Vec<V3Singer>,
    /// 专辑。
    pub album: Option<V3Album>,
    /// 时长（秒）。
    #[serde(default)]
    pub interval: u64,
}

/// v3 歌手。
#[derive(Debug, Deserialize)]
pub struct V3Singer {
    /// 歌手名。
    pub name: Option<String>,
}

/// v3 专辑。
#[derive(Debug, Deserialize)]
pub struct V3Album {
    /// 专辑名。
    pub name: Option<String>,
    /// 专辑 mid，用于拼接封面地址。
    pub mid: Option<String>,
}

/// v3 歌曲信息中的一档音质。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityTier {
    /// 音质码。
    pub tier: u32,
    /// 文件大小（字节），不可用时为 0。
    pub size: u64,
}

/// 解析 `3分43秒`、`03:43` 或纯秒数形式的时长，返回毫秒。
pub fn parse_interval(text: &str) -> u64 {
    let text = text.trim();
    if let Ok(secs) = text.parse::<u64>() {
        return secs_to_ms(secs);
    }
    let split = text.split_once(':').or_else(|| text.split_once('分'));
    if let Some((m, s)) = split {
        let m = m.trim().parse::<u64>().unwrap_or(0);
        let s = s.trim_end_matches('秒').trim().parse::<u64>().unwrap_or(0);
        return min_sec_to_ms(m, s);
    }
    secs_to_ms(text.trim_end_matches('秒').parse::<u64>().unwrap_or(0))
}

fn required(provider_id: &str, value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::normalization(provider_id, format!("缺少必需字段 `{field}`")))
}

/// v2 的 `data` 可能是数组，也可能是单个对象。
fn data_items(body: &Value) -> Vec<Value> {
    match body.get("data") {
        Some(Value::Array(items)) => items.clone(),
        Some(obj @ Value::Object(_)) => vec![obj.clone()],
        _ => Vec::new(),
    }
}

/// 映射 v2 搜索响应。字段名按 `platform` 选择，不依据内容猜测。
pub fn normalize_v2(provider_id: &str, platform: Platform, body: &Value) -> Result<Vec<Track>> {
    expect_code(provider_id, body, V2_SUCCESS)?;

    data_items(body)
        .into_iter()
        .map(|raw| match platform {
            Platform::Tencent => map_v2_tencent(provider_id, raw),
            _ => map_v2_netease(provider_id, raw),
        })
        .collect()
}

fn map_v2_tencent(provider_id: &str, raw: Value) -> Result<Track> {
    let item: V2TencentItem = serde_json::from_value(raw)
        .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;

    let numeric_id = item.id.as_ref().and_then(value_as_id);
    let external_id = required(provider_id, item.mid.or_else(|| numeric_id.clone()), "mid")?;
    let title = required(provider_id, item.song, "song")?;
    let artist = required(provider_id, item.singer, "singer")?;

    let mut track = Track::new(Platform::Tencent, external_id, title, artist, provider_id)
        .with_direct_url(item.url);
    if let Some(id) = numeric_id {
        track = track.with_hint("id", id);
    }
    if let Some(quality) = item.quality {
        track = track.with_hint("quality", quality);
    }
    if let Some(kind) = item.kind {
        track = track.with_hint("type", kind);
    }
    track.album = item.album.filter(|a| !a.is_empty());
    track.cover = item.cover.filter(|c| !c.is_empty());
    track.duration_ms = item.interval.as_deref().map(parse_interval).unwrap_or(0);
    Ok(track)
}

fn map_v2_netease(provider_id: &str, raw: Value) -> Result<Track> {
    let item: V2NeteaseItem = serde_json::from_value(raw)
        .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;

    let external_id = required(provider_id, item.id.as_ref().and_then(value_as_id), "id")?;
    let title = required(provider_id, item.name, "name")?;
    let artist = required(provider_id, item.artist, "artist")?;

    let mut track = Track::new(Platform::Netease, external_id, title, artist, provider_id)
        .with_direct_url(item.url);
    track.album = item.album.filter(|a| !a.is_empty());
    track.cover = item.cover.filter(|c| !c.is_empty());
    track.duration_ms = item.interval.as_deref().map(parse_interval).unwrap_or(0);
    Ok(track)
}

/// 映射 v3 搜索响应（仅 QQ 音乐）。
pub fn normalize_v3(provider_id: &str, body: &Value) -> Result<Vec<Track>> {
    expect_code(provider_id, body, V3_SUCCESS)?;

    let data: V3SearchData = match body.get("data") {
        Some(data) if !data.is_null() => serde_json::from_value(data.clone())
            .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?,
        _ => return Ok(Vec::new()),
    };

    data.list
        .into_iter()
        .map(|song| {
            let mid = required(provider_id, song.mid, "mid")?;
            let title = required(provider_id, song.title, "title")?;
            let artist = song
                .singer_list
                .iter()
                .filter_map(|s| s.name.as_deref())
                .filter(|n| !n.is_empty())
                .collect::<Vec<_>>()
                .join(" / ");
            let artist = required(provider_id, Some(artist), "singerList")?;

            let mut track = Track::new(Platform::Tencent, mid, title, artist, provider_id);
            if let Some(id) = song.id.as_ref().and_then(value_as_id) {
                track = track.with_hint("id", id);
            }
            if let Some(subtitle) = song.subtitle.filter(|s| !s.is_empty()) {
                track = track.with_hint("subtitle", subtitle);
            }
            if let Some(album) = song.album {
                track.cover = album
                    .mid
                    .filter(|m| !m.is_empty())
                    .map(|m| format!("{TENCENT_COVER_PREFIX}{m}.jpg"));
                track.album = album.name.filter(|n| !n.is_empty());
            }
            track.duration_ms = secs_to_ms(song.interval);
            Ok(track)
        })
        .collect()
}

/// 从 v3 歌曲信息响应中取出音质列表。
///
/// 列表可能位于 `data.qualityList`、`data.quality`、`data.file` 或直接是 `data`；
/// 每一项的音质码字段为 `quality`，部分版本使用 `type`。
pub fn quality_tiers(provider_id: &str, body: &Value) -> Result<Vec<QualityTier>> {
    expect_code(provider_id, body, V3_SUCCESS)?;

    let data = body
        .get("data")
        .ok_or_else(|| EngineError::upstream(provider_id, "歌曲信息缺少 data"))?;
    let list = ["qualityList", "quality", "file"]
        .iter()
        .find_map(|key| data.get(key).and_then(Value::as_array))
        .or_else(|| data.as_array())
        .ok_or_else(|| EngineError::normalization(provider_id, "歌曲信息中没有音质列表"))?;

    Ok(list
        .iter()
        .filter_map(|entry| {
            let tier = entry
                .get("quality")
                .or_else(|| entry.get("type"))
                .and_then(value_as_i64)?;
            let size = entry.get("size").and_then(value_as_i64).unwrap_or(0);
            Some(QualityTier {
                tier: u32::try_from(tier).ok()?,
                size: u64::try_from(size).unwrap_or(0),
            })
        })
        .collect())
}

/// 从 v2 链接响应中取出播放链接。
pub fn url_from_v2(provider_id: &str, body: &Value) -> Result<String> {
    expect_code(provider_id, body, V2_SUCCESS)?;
    data_items(body)
        .iter()
        .find_map(|d| d.get("url").and_then(Value::as_str))
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::upstream(provider_id, "响应中没有播放链接"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn v2_fields_follow_platform_argument() {
        let tencent = json!({"code": 200, "data": [{
            "id": 97773, "mid": "003aAYrm3GE0Ac", "song": "稻香", "singer": "周杰伦",
            "album": "魔杰座", "interval": "3分43秒", "quality": "SQ无损", "type": 0
        }]});
        let tracks = normalize_v2("vkeys-v2", Platform::Tencent, &tencent).unwrap();
        assert_eq!(tracks[0].external_id, "003aAYrm3GE0Ac");
        assert_eq!(tracks[0].artist, "周杰伦");
        assert_eq!(tracks[0].duration_ms, 223_000);
        assert_eq!(tracks[0].provenance.hints["id"], "97773");

        let netease = json!({"code": 200, "data": [{"id": 186001, "name": "稻香", "artist": "周杰伦"}]});
        let tracks = normalize_v2("vkeys-v2", Platform::Netease, &netease).unwrap();
        assert_eq!(tracks[0].title, "稻香");
        assert_eq!(tracks[0].platform, Platform::Netease);

        // 同样的网易云数据按 tencent 解读时缺少 `song` 字段
        assert!(normalize_v2("vkeys-v2", Platform::Tencent, &netease).is_err());
    }

    #[test]
    fn v3_success_code_is_zero() {
        let body = json!({"code": 0, "data": {"list": [{
            "mid": "003aAYrm3GE0Ac", "id": 97773, "title": "稻香",
            "singerList": [{"name": "周杰伦"}, {"name": "客串"}],
            "album": {"name": "魔杰座", "mid": "002Neh8l0uciQZ"}, "interval": 223
        }]}});
        let tracks = normalize_v3("vkeys-v3", &body).unwrap();
        assert_eq!(tracks[0].artist, "周杰伦 / 客串");
        assert_eq!(
            tracks[0].cover.as_deref(),
            Some("https://y.gtimg.cn/music/photo_new/T002R300x300M000002Neh8l0uciQZ.jpg")
        );

        let v2_style = json!({"code": 200, "data": {"list": []}});
        assert!(matches!(
            normalize_v3("vkeys-v3", &v2_style),
            Err(EngineError::Upstream { .. })
        ));
    }

    #[test]
    fn quality_tiers_accept_both_key_names() {
        let body = json!({"code": 0, "data": {"qualityList": [
            {"quality": 8, "size": 0},
            {"type": 4, "size": "3500000"},
            {"name": "broken"}
        ]}});
        let tiers = quality_tiers("vkeys-v3", &body).unwrap();
        assert_eq!(
            tiers,
            vec![QualityTier { tier: 8, size: 0 }, QualityTier { tier: 4, size: 3_500_000 }]
        );
    }

    #[test]
    fn interval_formats() {
        assert_eq!(parse_interval("03:43"), 223_000);
        assert_eq!(parse_interval("223"), 223_000);
        assert_eq!(parse_interval("45秒"), 45_000);
        assert_eq!(parse_interval("?"), 0);
    }

    #[test]
    fn oversized_intervals_become_zero() {
        let v2 = json!({"code": 200, "data": [{
            "mid": "003aAYrm3GE0Ac", "song": "稻香", "singer": "周杰伦",
            "interval": "20000000000000000"
        }]});
        let tracks = normalize_v2("vkeys-v2", Platform::Tencent, &v2).unwrap();
        assert_eq!(tracks[0].duration_ms, 0);

        let v3 = json!({"code": 0, "data": {"list": [{
            "mid": "003aAYrm3GE0Ac", "title": "稻香",
            "singerList": [{"name": "周杰伦"}], "interval": 20000000000000000u64
        }]}});
        let tracks = normalize_v3("vkeys-v3", &v3).unwrap();
        assert_eq!(tracks[0].duration_ms, 0);

        assert_eq!(parse_interval("99999999999999999:30"), 0);
        assert_eq!(parse_interval("99999999999999999分30秒"), 0);
    }

    #[test]
    fn v2_url_accepts_single_object() {
        let body = json!({"code": 200, "data": {"url": "http://isure.stream.qqmusic.qq.com/a.m4a"}});
        assert_eq!(
            url_from_v2("vkeys-v2", &body).unwrap(),
            "http://isure.stream.qqmusic.qq.com/a.m4a"
        );
    }
}
