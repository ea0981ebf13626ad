//! 负责处理引擎配置：音源列表、音质偏好、歌词策略与地区探测。

use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::info;

use crate::{
    error::{EngineError, Result},
    model::track::Platform,
    providers::ProviderFamily,
};

const CONFIG_DIR_NAME: &str = "song-source-engine";
const CONFIG_FILE_NAME: &str = "sources.json";

const DEFAULT_TIMEOUT_MS: u64 = 8000;
const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 5000;

/// 默认的网易云音质等级（4 = lossless）。
pub const DEFAULT_NETEASE_QUALITY: u32 = 4;
/// 默认的 QQ 音乐音质码。
pub const DEFAULT_TENCENT_QUALITY: u32 = 8;

/// 一个已配置的音源。运行期间不可变，以 `id` 作为唯一标识。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicSource {
    /// 音源 ID，同时决定使用哪一种音源实现。
    pub id: String,
    /// 展示名称。
    #[serde(default)]
    pub display_name: String,
    /// 接口根地址。
    pub base_url: String,
    /// 单次调用超时（毫秒）。
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 附加请求头。
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 是否启用。
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

impl MusicSource {
    /// 以默认超时创建一个已启用的音源。
    pub fn new(id: &str, display_name: &str, base_url: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            base_url: base_url.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// 单次调用超时。
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 拼接接口路径。
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// 此音源对应的实现族。
    pub fn family(&self) -> Option<ProviderFamily> {
        ProviderFamily::for_source_id(&self.id)
    }
}

/// 各平台的默认音质偏好。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityPreference {
    /// 网易云数值音质（映射到 standard..jymaster）。
    pub netease: u32,
    /// QQ 音乐音质码。
    pub tencent: u32,
}

impl Default for QualityPreference {
    fn default() -> Self {
        Self {
            netease: DEFAULT_NETEASE_QUALITY,
            tencent: DEFAULT_TENCENT_QUALITY,
        }
    }
}

impl QualityPreference {
    /// 指定平台的默认音质。
    pub fn for_platform(&self, platform: Platform) -> u32 {
        match platform {
            Platform::Tencent => self.tencent,
            _ => self.netease,
        }
    }
}

/// 歌词来源的优先策略。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LyricStrategy {
    /// QQ 音乐（逐字 QRC）优先。
    Qm,
    /// TTML 优先。
    Ttml,
    /// 官方接口优先。
    Official,
    /// QQ 音乐与 TTML+官方 并发，择优。
    #[default]
    Auto,
}

/// 部署地区的判定方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionMode {
    /// 首次需要时探测一次。
    #[default]
    Auto,
    /// 视为部署在中国大陆。
    China,
    /// 视为部署在海外。
    Overseas,
}

/// 引擎的完整配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// 音源列表，顺序即同族音源之间的尝试顺序。
    pub sources: Vec<MusicSource>,
    /// 音质偏好。
    #[serde(default)]
    pub quality: QualityPreference,
    /// 歌词策略。
    #[serde(default)]
    pub lyric_strategy: LyricStrategy,
    /// 默认是否解灰（播客除外）。
    #[serde(default = "default_true")]
    pub unblock_default: bool,
    /// 地区判定方式。
    #[serde(default)]
    pub region: RegionMode,
    /// 地区探测接口。
    #[serde(default = "default_geo_probe_url")]
    pub geo_probe_url: String,
    /// 社区 TTML 歌词库的原始文件根地址。
    #[serde(default = "default_ttml_database_url")]
    pub ttml_database_url: String,
    /// 播放链接探测的超时（毫秒）。
    #[serde(default = "default_validation_timeout_ms")]
    pub validation_timeout_ms: u64,
}

fn default_geo_probe_url() -> String {
    "http://ip-api.com/json/?fields=countryCode".to_string()
}

fn default_ttml_database_url() -> String {
    "https://raw.githubusercontent.com/Steve-xmh/amll-ttml-db/main".to_string()
}

fn default_validation_timeout_ms() -> u64 {
    DEFAULT_VALIDATION_TIMEOUT_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sources: vec![
                MusicSource::new("netease-backup-1", "网易云备用 1", "http://127.0.0.1:3000"),
                MusicSource::new("netease-backup-2", "网易云备用 2", "http://127.0.0.1:3001"),
                MusicSource::new("vkeys-v2", "vkeys v2", "https://api.vkeys.cn/v2/music"),
                MusicSource::new("vkeys-v3", "vkeys v3", "https://api.vkeys.cn/music"),
                MusicSource::new("meting-1", "Meting", "https://api.injahow.cn/meting/"),
                MusicSource::new("bilibili", "哔哩哔哩", "http://127.0.0.1:3100"),
                MusicSource::new("native-api", "本地原生接口", "http://127.0.0.1:8080"),
            ],
            quality: QualityPreference::default(),
            lyric_strategy: LyricStrategy::default(),
            unblock_default: true,
            region: RegionMode::default(),
            geo_probe_url: default_geo_probe_url(),
            ttml_database_url: default_ttml_database_url(),
            validation_timeout_ms: DEFAULT_VALIDATION_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// 从默认配置目录加载 `sources.json`，文件不存在时使用内置默认配置。
    pub fn load() -> Result<Self> {
        let path = get_config_file_path(CONFIG_FILE_NAME)?;
        match fs::read_to_string(&path) {
            Ok(content) => {
                let config = Self::from_json_str(&content)?;
                info!("[Config] 已从 {} 加载 {} 个音源。", path.display(), config.sources.len());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[Config] 配置文件不存在，使用内置默认音源列表。");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 从 JSON 字符串解析配置。
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// 将配置写回默认配置目录。
    pub fn save(&self) -> Result<()> {
        let path = get_config_file_path(CONFIG_FILE_NAME)?;
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        info!("[Config] 配置已保存到 {}。", path.display());
        Ok(())
    }

    /// 播放链接探测的超时。
    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}

/// 获取配置目录下指定文件的完整路径。
fn get_config_file_path(filename: &str) -> Result<PathBuf> {
    let mut config_dir = dirs::config_dir().ok_or_else(|| {
        EngineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "无法找到用户配置目录",
        ))
    })?;
    config_dir.push(CONFIG_DIR_NAME);
    fs::create_dir_all(&config_dir)?;
    config_dir.push(filename);
    Ok(config_dir)
}

/// 校验过的音源列表。
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<MusicSource>,
}

impl SourceRegistry {
    /// 校验并创建注册表。
    ///
    /// 音源 ID 重复、或 ID 无法对应到任何实现时返回 `Configuration` 错误。
    pub fn new(sources: Vec<MusicSource>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for source in &sources {
            if !seen.insert(source.id.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "音源 ID 重复: '{}'",
                    source.id
                )));
            }
            if source.family().is_none() {
                return Err(EngineError::Configuration(format!(
                    "无法识别的音源 ID: '{}'",
                    source.id
                )));
            }
        }
        Ok(Self { sources })
    }

    /// 所有已配置的音源（包括未启用的）。
    pub fn all(&self) -> &[MusicSource] {
        &self.sources
    }

    /// 所有已启用的音源，保持配置顺序。
    pub fn enabled_sources(&self) -> impl Iterator<Item = &MusicSource> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// 按 ID 查找音源。
    pub fn source_by_id(&self, id: &str) -> Option<&MusicSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// 按 ID 查找已启用的音源。
    pub fn enabled_by_id(&self, id: &str) -> Option<&MusicSource> {
        self.source_by_id(id).filter(|s| s.enabled)
    }

    /// 属于指定实现族的已启用音源。
    pub fn enabled_of_family(
        &self,
        family: ProviderFamily,
    ) -> impl Iterator<Item = &MusicSource> {
        self.enabled_sources()
            .filter(move |s| s.family() == Some(family))
    }
}
