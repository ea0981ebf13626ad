//! 此模块定义了网易云兼容后端各接口的响应结构，以及它们到 `Track` 的映射。
//! 接口来源于 <https://github.com/NeteaseCloudMusicApiReborn/api>

use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{EngineError, Result},
    model::track::{Platform, Track},
    providers::{netease::crypto, value_as_id},
};

// =================================================================
// 云搜索接口 (`/cloudsearch`) 的模型，自带专辑封面
// =================================================================

/// 云搜索的顶层响应。
#[derive(Debug, Deserialize)]
pub struct CloudSearchResult {
    /// API 返回码，`200` 表示成功。
    pub code: i64,
    /// 搜索结果容器。
    pub result: Option<CloudSearchData>,
}

/// 云搜索的数据部分。
#[derive(Debug, Deserialize)]
pub struct CloudSearchData {
    /// 匹配到的歌曲。
    #[serde(default)]
    pub songs: Vec<CloudSong>,
}

/// 云搜索中的歌曲。
#[derive(Debug, Deserialize)]
pub struct CloudSong {
    /// 歌曲 ID。
    pub id: Option<Value>,
    /// 歌曲名。
    pub name: Option<String>,
    /// 艺术家列表。
    #[serde(default)]
    pub ar: Vec<Artist>,
    /// 专辑。
    pub al: Option<CloudAlbum>,
    /// 时长（毫秒）。
    #[serde(default)]
    pub dt: u64,
    /// 付费类型。
    pub fee: Option<i64>,
}

/// 云搜索中的专辑，带封面链接。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudAlbum {
    /// 专辑名。
    pub name: Option<String>,
    /// 封面链接。
    pub pic_url: Option<String>,
    /// 封面图片 ID。
    pub pic: Option<Value>,
}

/// 艺术家。
#[derive(Debug, Deserialize)]
pub struct Artist {
    /// 艺术家名。
    pub name: Option<String>,
}

// =================================================================
// 普通搜索接口 (`/search`) 的模型，不带封面链接
// =================================================================

/// 普通搜索的顶层响应。
#[derive(Debug, Deserialize)]
pub struct PlainSearchResult {
    /// API 返回码。
    pub code: i64,
    /// 搜索结果容器。
    pub result: Option<PlainSearchData>,
}

/// 普通搜索的数据部分。
#[derive(Debug, Deserialize)]
pub struct PlainSearchData {
    /// 匹配到的歌曲。
    #[serde(default)]
    pub songs: Vec<PlainSong>,
}

/// 普通搜索中的歌曲。
#[derive(Debug, Deserialize)]
pub struct PlainSong {
    /// 歌曲 ID。
    pub id: Option<Value>,
    /// 歌曲名。
    pub name: Option<String>,
    /// 艺术家列表。
    #[serde(default)]
    pub artists: Vec<Artist>,
    /// 专辑。
    pub album: Option<PlainAlbum>,
    /// 时长（毫秒）。
    #[serde(default)]
    pub duration: u64,
}

/// 普通搜索中的专辑，只有封面图片 ID。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainAlbum {
    /// 专辑名。
    pub name: Option<String>,
    /// 封面图片 ID。
    pub pic_id: Option<Value>,
}

// =================================================================
// 歌曲详情接口 (`/song/detail`) 的模型，用于补齐封面
// =================================================================

/// 歌曲详情的顶层响应。
#[derive(Debug, Deserialize)]
pub struct DetailResult {
    /// API 返回码。
    pub code: i64,
    /// 歌曲详情列表。
    #[serde(default)]
    pub songs: Vec<CloudSong>,
}

// =================================================================
// 电台节目接口 (`/cloudsearch?type=1009` 与 `/dj/program`) 的模型
// =================================================================

/// 电台搜索的顶层响应。
#[derive(Debug, Deserialize)]
pub struct RadioSearchResult {
    /// API 返回码。
    pub code: i64,
    /// 搜索结果容器。
    pub result: Option<RadioSearchData>,
}

/// 电台搜索的数据部分。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadioSearchData {
    /// 匹配到的电台。
    #[serde(default)]
    pub dj_radios: Vec<Radio>,
}

/// 电台。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Radio {
    /// 电台 ID。
    pub id: Option<Value>,
    /// 电台名。
    pub name: Option<String>,
    /// 电台封面。
    pub pic_url: Option<String>,
}

/// 电台节目列表的顶层响应。
#[derive(Debug, Deserialize)]
pub struct ProgramListResult {
    /// API 返回码。
    pub code: i64,
    /// 节目列表。
    #[serde(default)]
    pub programs: Vec<Program>,
}

/// 电台节目（声音）。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    /// 节目 ID。
    pub id: Option<Value>,
    /// 节目名。
    pub name: Option<String>,
    /// 节目封面。
    pub cover_url: Option<String>,
    /// 时长（毫秒）。
    #[serde(default)]
    pub duration: u64,
    /// 节目背后真正可播放的歌曲。
    pub main_song: Option<ProgramSong>,
    /// 主播。
    pub dj: Option<DjInfo>,
    /// 所属电台。
    pub radio: Option<Radio>,
}

/// 节目关联的歌曲。
#[derive(Debug, Deserialize)]
pub struct ProgramSong {
    /// 歌曲 ID。
    pub id: Option<Value>,
    /// 时长（毫秒）。
    #[serde(default)]
    pub duration: u64,
}

/// 主播信息。
#[derive(Debug, Deserialize)]
pub struct DjInfo {
    /// 主播昵称。
    pub nickname: Option<String>,
}

// =================================================================
// 播放链接接口 (`/song/url/v1`) 的模型
// =================================================================

/// 播放链接接口的顶层响应。
#[derive(Debug, Deserialize)]
pub struct SongUrlResult {
    /// API 返回码。
    pub code: i64,
    /// 每首歌一条。
    #[serde(default)]
    pub data: Vec<SongUrlData>,
}

/// 单首歌的链接信息。
#[derive(Debug, Deserialize)]
pub struct SongUrlData {
    /// 播放链接，无版权时为 `null`。
    pub url: Option<String>,
    /// 单曲状态码。
    pub code: Option<i64>,
    /// 实际返回的音质等级。
    pub level: Option<String>,
}

// =================================================================
// 歌词接口 (`/lyric/new`, `/lyric`) 的模型
// =================================================================

/// 歌词接口的顶层响应。
#[derive(Debug, Deserialize)]
pub struct LyricResult {
    /// API 返回码。
    pub code: i64,
    /// 标准 LRC 歌词。
    pub lrc: Option<LyricData>,
    /// 翻译 LRC 歌词。
    pub tlyric: Option<LyricData>,
    /// 逐字 YRC 歌词。
    pub yrc: Option<LyricData>,
}

/// 单一歌词内容的数据结构。
#[derive(Debug, Deserialize)]
pub struct LyricData {
    /// 歌词文本内容。
    #[serde(default)]
    pub lyric: String,
}

impl LyricResult {
    /// 取出非空的歌词文本。
    pub fn text(slot: &Option<LyricData>) -> String {
        slot.as_ref()
            .map(|d| d.lyric.clone())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_default()
    }
}

// =================================================================
// 映射
// =================================================================

fn join_artists(artists: &[Artist]) -> String {
    artists
        .iter()
        .filter_map(|a| a.name.as_deref())
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

fn required(provider_id: &str, value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EngineError::normalization(provider_id, format!("缺少必需字段 `{field}`")))
}

fn check_envelope(provider_id: &str, code: i64) -> Result<()> {
    if code == 200 {
        Ok(())
    } else {
        Err(EngineError::upstream(provider_id, format!("网易云接口返回码 {code}")))
    }
}

/// 根据封面图片 ID 推导封面链接。
pub fn cover_from_pic_id(pic_id: &Value) -> Option<String> {
    let id = value_as_id(pic_id).filter(|id| id != "0")?;
    Some(format!(
        "https://p1.music.126.net/{}/{}.jpg",
        crypto::encrypt_pic_id(&id),
        id
    ))
}

fn map_cloud_song(provider_id: &str, song: CloudSong) -> Result<Track> {
    let id = required(provider_id, song.id.as_ref().and_then(value_as_id), "id")?;
    let title = required(provider_id, song.name, "name")?;
    let artist = required(provider_id, Some(join_artists(&song.ar)), "ar")?;

    let (album, cover) = match song.al {
        Some(al) => {
            let cover = al
                .pic_url
                .filter(|u| !u.is_empty())
                .or_else(|| al.pic.as_ref().and_then(cover_from_pic_id));
            (al.name.filter(|n| !n.is_empty()), cover)
        }
        None => (None, None),
    };

    let mut track = Track::new(Platform::Netease, id.clone(), title, artist, provider_id)
        .with_hint("numericId", id);
    if let Some(fee) = song.fee {
        track = track.with_hint("fee", fee);
    }
    track.album = album;
    track.cover = cover;
    track.duration_ms = song.dt;
    Ok(track)
}

/// 映射云搜索 (`/cloudsearch`) 的响应。
pub fn normalize_cloud_search(provider_id: &str, raw: &Value) -> Result<Vec<Track>> {
    let resp: CloudSearchResult = serde_json::from_value(raw.clone())
        .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;
    check_envelope(provider_id, resp.code)?;

    resp.result
        .map(|r| r.songs)
        .unwrap_or_default()
        .into_iter()
        .map(|song| map_cloud_song(provider_id, song))
        .collect()
}

/// 映射普通搜索 (`/search`) 的响应。
///
/// 这里只能从 `picId` 推导封面，真正的封面需要之后用详情接口补齐。
pub fn normalize_plain_search(provider_id: &str, raw: &Value) -> Result<Vec<Track>> {
    let resp: PlainSearchResult = serde_json::from_value(raw.clone())
        .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;
    check_envelope(provider_id, resp.code)?;

    resp.result
        .map(|r| r.songs)
        .unwrap_or_default()
        .into_iter()
        .map(|song| {
            let id = required(provider_id, song.id.as_ref().and_then(value_as_id), "id")?;
            let title = required(provider_id, song.name, "name")?;
            let artist = required(provider_id, Some(join_artists(&song.artists)), "artists")?;

            let mut track = Track::new(Platform::Netease, id.clone(), title, artist, provider_id)
                .with_hint("numericId", id);
            if let Some(album) = song.album {
                track.cover = album.pic_id.as_ref().and_then(cover_from_pic_id);
                track.album = album.name.filter(|n| !n.is_empty());
            }
            track.duration_ms = song.duration;
            Ok(track)
        })
        .collect()
}

/// 映射电台节目 (`/dj/program`) 的响应。
///
/// 节目的标题取节目名，艺术家取主播昵称，专辑取电台名；
/// `external_id` 取节目背后的 `mainSong.id`，这样可以直接走播放链接接口。
pub fn normalize_programs(provider_id: &str, raw: &Value) -> Result<Vec<Track>> {
    let resp: ProgramListResult = serde_json::from_value(raw.clone())
        .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;
    check_envelope(provider_id, resp.code)?;

    resp.programs
        .into_iter()
        .map(|program| {
            let main_song = program.main_song.ok_or_else(|| {
                EngineError::normalization(provider_id, "节目缺少 `mainSong`")
            })?;
            let song_id = required(provider_id, main_song.id.as_ref().and_then(value_as_id), "mainSong.id")?;
            let title = required(provider_id, program.name, "name")?;
            let artist = required(
                provider_id,
                program.dj.and_then(|dj| dj.nickname),
                "dj.nickname",
            )?;

            let mut track = Track::new(Platform::NeteasePodcast, song_id, title, artist, provider_id)
                .with_hint("type", "voice");
            if let Some(program_id) = program.id.as_ref().and_then(value_as_id) {
                track = track.with_hint("programId", program_id);
            }
            let radio_cover = program.radio.as_ref().and_then(|r| r.pic_url.clone());
            track.album = program.radio.and_then(|r| r.name);
            track.cover = program.cover_url.filter(|u| !u.is_empty()).or(radio_cover);
            track.duration_ms = if program.duration > 0 {
                program.duration
            } else {
                main_song.duration
            };
            Ok(track)
        })
        .collect()
}

/// 从电台搜索结果中取出电台 ID。
pub fn radio_ids(provider_id: &str, raw: &Value) -> Result<Vec<String>> {
    let resp: RadioSearchResult = serde_json::from_value(raw.clone())
        .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;
    check_envelope(provider_id, resp.code)?;
    Ok(resp
        .result
        .map(|r| r.dj_radios)
        .unwrap_or_default()
        .iter()
        .filter_map(|r| r.id.as_ref().and_then(value_as_id))
        .collect())
}

/// 从详情接口的响应中取出 `id -> 封面` 映射。
pub fn detail_covers(provider_id: &str, raw: &Value) -> Result<Vec<(String, String)>> {
    let resp: DetailResult = serde_json::from_value(raw.clone())
        .map_err(|e| EngineError::normalization(provider_id, e.to_string()))?;
    check_envelope(provider_id, resp.code)?;
    Ok(resp
        .songs
        .into_iter()
        .filter_map(|song| {
            let id = song.id.as_ref().and_then(value_as_id)?;
            let cover = song.al.and_then(|al| al.pic_url).filter(|u| !u.is_empty())?;
            Some((id, cover))
        })
        .collect())
}
