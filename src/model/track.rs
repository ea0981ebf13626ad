//! 定义了搜索、解析与歌词相关的核心数据结构，包括搜索参数、规范化的歌曲模型和各类返回值。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};

/// 目标音乐平台。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Platform {
    /// 网易云音乐。
    #[default]
    Netease,
    /// QQ 音乐。
    Tencent,
    /// 哔哩哔哩视频音频。
    Bilibili,
    /// 网易云播客/声音节目。
    NeteasePodcast,
}

impl Platform {
    /// 是否为播客平台。
    pub fn is_podcast(self) -> bool {
        matches!(self, Self::NeteasePodcast)
    }
}

/// 搜索类型，数值与网易云接口保持一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SearchType {
    /// 单曲 (1)。
    #[default]
    Song,
    /// 播客/电台 (1009)。
    Podcast,
}

impl SearchType {
    /// 对应的整数值。
    pub fn code(self) -> u32 {
        match self {
            Self::Song => 1,
            Self::Podcast => 1009,
        }
    }
}

impl TryFrom<u32> for SearchType {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Song),
            1009 => Ok(Self::Podcast),
            other => Err(format!("不支持的搜索类型: {other}")),
        }
    }
}

impl From<SearchType> for u32 {
    fn from(value: SearchType) -> Self {
        value.code()
    }
}

/// 一次搜索调用的参数。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// 搜索关键词。
    pub keywords: String,
    /// 目标平台。
    #[serde(default)]
    pub platform: Platform,
    /// 搜索类型。
    #[serde(default)]
    pub search_type: SearchType,
    /// 每页数量。
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// 偏移量。
    #[serde(default)]
    pub offset: u32,
    /// 可选的用户 Cookie，透传给支持它的音源。
    #[serde(default)]
    pub cookie: Option<String>,
}

fn default_limit() -> u32 {
    30
}

impl SearchParams {
    /// 以默认分页参数创建单曲搜索。
    pub fn new(keywords: impl Into<String>, platform: Platform) -> Self {
        Self {
            keywords: keywords.into(),
            platform,
            search_type: SearchType::Song,
            limit: default_limit(),
            offset: 0,
            cookie: None,
        }
    }

    /// 切换为播客搜索。
    pub fn podcast(mut self) -> Self {
        self.search_type = SearchType::Podcast;
        self
    }

    /// 是否为播客搜索。
    pub fn is_podcast(&self) -> bool {
        self.search_type == SearchType::Podcast
    }

    /// 从 1 开始的页码。
    pub fn page(&self) -> u32 {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }
}

/// 歌曲的来源信息。
///
/// `hints` 是音源私有的附加数据（如内部数字 ID、音质/类型码），
/// 只能被产生它的同一个音源解读。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// 产生此记录的音源 ID。
    pub source_id: String,
    /// 该音源中的原始 ID。
    pub original_id: String,
    /// 获取时间。
    pub fetched_at: DateTime<Utc>,
    /// 音源私有的附加信息。
    #[serde(default)]
    pub hints: Map<String, Value>,
}

/// 规范化后的歌曲模型，与具体音源无关。
///
/// `platform` 加 `external_id` 足以在之后重新解析播放链接而无需再次搜索。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// 引擎内唯一 ID，形如 `netease_12345`。
    pub id: String,
    /// 歌曲标题。
    pub title: String,
    /// 艺术家，多位艺术家以 ` / ` 连接。
    pub artist: String,
    /// 封面链接。
    pub cover: Option<String>,
    /// 专辑名。
    pub album: Option<String>,
    /// 时长（毫秒）。
    pub duration_ms: u64,
    /// 所属平台。
    pub platform: Platform,
    /// 平台上的歌曲 ID。
    pub external_id: String,
    /// 搜索结果中直接附带的播放链接。
    pub direct_url: Option<String>,
    /// 是否附带播放链接。
    pub has_direct_url: bool,
    /// 来源信息。
    pub provenance: Provenance,
}

impl Track {
    /// 创建一个只包含必需字段的 `Track`。
    pub fn new(
        platform: Platform,
        external_id: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        source_id: &str,
    ) -> Self {
        let external_id = external_id.into();
        Self {
            id: format!("{platform}_{external_id}"),
            title: title.into(),
            artist: artist.into(),
            cover: None,
            album: None,
            duration_ms: 0,
            platform,
            external_id: external_id.clone(),
            direct_url: None,
            has_direct_url: false,
            provenance: Provenance {
                source_id: source_id.to_string(),
                original_id: external_id,
                fetched_at: Utc::now(),
                hints: Map::new(),
            },
        }
    }

    /// 附上直链。空字符串视为没有直链。
    pub fn with_direct_url(mut self, url: Option<String>) -> Self {
        self.direct_url = url.filter(|u| !u.is_empty());
        self.has_direct_url = self.direct_url.is_some();
        self
    }

    /// 写入一条来源私有信息。
    pub fn with_hint(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.provenance.hints.insert(key.to_string(), value.into());
        self
    }
}

/// 判断一首歌是否为播客/声音节目。
///
/// 三个条件任一成立即可。
// TODO: 第三个条件已被第二个覆盖，待确认上游 `sourceInfo` 语义后合并为单一判断。
pub fn is_podcast(track: &Track) -> bool {
    let hint_type = track.provenance.hints.get("type").and_then(Value::as_str);
    track.platform.is_podcast()
        || hint_type == Some("voice")
        || (track.provenance.source_id.contains("netease-backup") && hint_type == Some("voice"))
}

/// 一次搜索的结果。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    /// 给出结果的音源。
    pub source_id: String,
    /// 规范化后的歌曲列表；为空表示音源正常应答但没有匹配项。
    pub tracks: Vec<Track>,
    /// 之后解析播放链接时应优先使用的音源。
    ///
    /// 仅当结果来自无法解析链接的本地原生接口时才会设置。
    pub resolve_source_id: Option<String>,
}

/// 解析播放链接时的附加选项。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// 是否允许解灰。未设置时使用配置默认值（播客除外）。
    pub unblock: Option<bool>,
    /// 哔哩哔哩分 P 的 cid。
    pub bilibili_cid: Option<String>,
    /// 优先尝试的音源 ID。
    pub preferred_source: Option<String>,
}

/// 成功解析出的播放链接。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUrl {
    /// 已校验的 HTTPS 链接。
    pub url: String,
    /// 给出链接的音源。
    pub source_id: String,
    /// 基于 Content-Length 估算的时长（秒）。
    pub estimated_duration_sec: Option<f64>,
}

/// `resolve_url` 的对外返回结构。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlResolution {
    /// 是否成功。
    pub success: bool,
    /// 播放链接。
    pub url: Option<String>,
    /// 给出链接的音源。
    pub source_id: Option<String>,
    /// 失败原因。
    pub error: Option<String>,
}

/// 歌词内容。空字符串表示该格式不可用。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyricsData {
    /// 逐行 LRC。
    pub lrc: String,
    /// 翻译 LRC。
    pub trans: String,
    /// 逐字歌词（网易云 YRC 或 QQ 音乐 QRC）。
    pub yrc: String,
    /// TTML。
    pub ttml: String,
}

impl LyricsData {
    /// 是否没有任何可用文本。
    pub fn is_empty(&self) -> bool {
        self.lrc.trim().is_empty()
            && self.yrc.trim().is_empty()
            && self.ttml.trim().is_empty()
    }

    /// 是否含有 TTML。
    pub fn has_ttml(&self) -> bool {
        !self.ttml.trim().is_empty()
    }

    /// 用 `other` 补齐当前为空的字段，已有内容不会被覆盖。
    pub fn fill_from(&mut self, other: LyricsData) {
        fn fill(slot: &mut String, value: String) {
            if slot.trim().is_empty() && !value.trim().is_empty() {
                *slot = value;
            }
        }
        fill(&mut self.lrc, other.lrc);
        fill(&mut self.trans, other.trans);
        fill(&mut self.yrc, other.yrc);
        fill(&mut self.ttml, other.ttml);
    }
}

/// `get_lyrics` 的对外返回结构。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricsResponse {
    /// 是否成功。
    pub success: bool,
    /// 歌词内容。
    pub data: Option<LyricsData>,
    /// 失败原因。
    pub error: Option<String>,
}
