//! 响应规范化。
//!
//! 每个音源族的原始 JSON 在这里统一映射为 [`Track`] 列表。
//! 所有映射都是纯函数，不做任何 I/O；具体的字段映射放在各音源模块中。

use serde_json::Value;

use crate::{
    error::Result,
    model::track::{Platform, Track},
    providers::{bilibili, meting, native, netease::models as netease, vkeys::models as vkeys},
};

/// 原始响应的形态。
///
/// 同一个音源族可能有多种形态，例如网易云兼容后端的云搜索、普通搜索与电台节目。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// 网易云兼容后端 `/cloudsearch`，自带封面。
    NeteaseCloudSearch,
    /// 网易云兼容后端 `/search`，封面需另行补齐。
    NeteaseSearch,
    /// 网易云兼容后端 `/dj/program`。
    NeteasePrograms,
    /// vkeys v2，字段名由平台决定。
    VkeysV2(Platform),
    /// vkeys v3（仅 QQ 音乐）。
    VkeysV3,
    /// 哔哩哔哩提取服务。
    Bilibili,
    /// Meting 代理。
    Meting,
    /// 本地原生接口。
    Native(Platform),
}

/// 将某个音源的原始响应映射为 `Track` 列表。
///
/// 必需字段（标题、艺术家、ID）缺失时返回 `Normalization` 错误，
/// 响应信封中的业务码不符时返回 `Upstream` 错误。
pub fn normalize(provider_id: &str, payload: Payload, raw: &Value) -> Result<Vec<Track>> {
    match payload {
        Payload::NeteaseCloudSearch => netease::normalize_cloud_search(provider_id, raw),
        Payload::NeteaseSearch => netease::normalize_plain_search(provider_id, raw),
        Payload::NeteasePrograms => netease::normalize_programs(provider_id, raw),
        Payload::VkeysV2(platform) => vkeys::normalize_v2(provider_id, platform, raw),
        Payload::VkeysV3 => vkeys::normalize_v3(provider_id, raw),
        Payload::Bilibili => bilibili::normalize_search(provider_id, raw),
        Payload::Meting => meting::normalize_search(provider_id, raw),
        Payload::Native(platform) => native::normalize_search(provider_id, platform, raw),
    }
}
