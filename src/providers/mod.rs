//! 音源模块
//!
//! 该模块定义了与各个上游音乐接口交互的核心抽象。
//! 每一种接口族对应一个 [`SourceProvider`] 实现，
//! 具体使用哪一个由音源 ID 通过 [`ProviderFamily::for_source_id`] 静态决定。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    config::{MusicSource, SourceRegistry},
    error::{EngineError, Result},
    http::{HttpRequest, HttpResponse, HttpTransport},
    model::track::{Platform, SearchParams, Track},
};

pub mod bilibili;
pub mod meting;
pub mod native;
pub mod netease;
pub mod vkeys;

use bilibili::BilibiliExtractor;
use meting::MetingProxy;
use native::NativeSearch;
use netease::NeteaseCompatible;
use vkeys::{VkeysV2, VkeysV3};

/// 音源实现族。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// 自建的网易云兼容后端。
    NeteaseCompatible,
    /// vkeys 第二代接口。
    VkeysV2,
    /// vkeys 第三代接口（仅 QQ 音乐）。
    VkeysV3,
    /// 哔哩哔哩音频提取服务。
    Bilibili,
    /// Meting 代理。
    Meting,
    /// 本地部署的原生搜索接口，只能搜索，不能解析链接。
    Native,
}

impl ProviderFamily {
    /// 根据音源 ID 确定实现族。
    pub fn for_source_id(id: &str) -> Option<Self> {
        match id {
            "vkeys-v2" => Some(Self::VkeysV2),
            "vkeys-v3" => Some(Self::VkeysV3),
            "bilibili" => Some(Self::Bilibili),
            "native-api" => Some(Self::Native),
            _ if id.contains("netease-backup") => Some(Self::NeteaseCompatible),
            _ if id.contains("meting") => Some(Self::Meting),
            _ => None,
        }
    }

    /// 是否为两代 vkeys 接口之一。
    pub fn is_vkeys(self) -> bool {
        matches!(self, Self::VkeysV2 | Self::VkeysV3)
    }
}

/// 解析播放链接时交给单个音源的参数。
#[derive(Debug, Clone)]
pub struct ResolveRequest<'a> {
    /// 平台。
    pub platform: Platform,
    /// 平台上的歌曲 ID。
    pub external_id: &'a str,
    /// 数值音质（已经用配置默认值补全）。
    pub quality: u32,
    /// 用户 Cookie。
    pub cookie: Option<&'a str>,
    /// 是否解灰。
    pub unblock: bool,
    /// 哔哩哔哩分 P 的 cid。
    pub bilibili_cid: Option<&'a str>,
}

/// 定义了所有音源实现需要提供的通用接口。
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// 返回实现族。
    fn family(&self) -> ProviderFamily;

    ///
    /// 在该音源上搜索。
    ///
    /// # 参数
    /// * `source` - 音源配置（根地址、超时、请求头）。
    /// * `params` - 搜索参数。
    ///
    /// # 返回
    /// 规范化后的歌曲列表。网络、业务码或解析失败都以 `Err` 返回。
    ///
    async fn search(&self, source: &MusicSource, params: &SearchParams) -> Result<Vec<Track>>;

    ///
    /// 解析一首歌的播放链接。返回的链接尚未经过校验。
    ///
    async fn resolve(&self, source: &MusicSource, request: &ResolveRequest<'_>) -> Result<String>;

    /// 能否为指定平台的歌曲解析链接。
    fn supports_resolve(&self, platform: Platform) -> bool;
}

/// 每个实现族各一个实例，共享同一个传输层。
pub struct ProviderSet {
    netease: NeteaseCompatible,
    vkeys_v2: VkeysV2,
    vkeys_v3: VkeysV3,
    bilibili: BilibiliExtractor,
    meting: MetingProxy,
    native: NativeSearch,
}

impl ProviderSet {
    /// 创建全部音源实现。
    pub fn new(transport: Arc<dyn HttpTransport>, registry: &SourceRegistry) -> Self {
        // v3 取链接借用 v2 的配置，v2 被禁用时 v3 也不取链接
        let v2_source = registry.enabled_by_id("vkeys-v2").cloned();
        Self {
            netease: NeteaseCompatible::new(transport.clone()),
            vkeys_v2: VkeysV2::new(transport.clone()),
            vkeys_v3: VkeysV3::new(transport.clone(), v2_source),
            bilibili: BilibiliExtractor::new(transport.clone()),
            meting: MetingProxy::new(transport.clone()),
            native: NativeSearch::new(transport),
        }
    }

    /// 取得指定实现族的实例。
    pub fn for_family(&self, family: ProviderFamily) -> &dyn SourceProvider {
        match family {
            ProviderFamily::NeteaseCompatible => &self.netease,
            ProviderFamily::VkeysV2 => &self.vkeys_v2,
            ProviderFamily::VkeysV3 => &self.vkeys_v3,
            ProviderFamily::Bilibili => &self.bilibili,
            ProviderFamily::Meting => &self.meting,
            ProviderFamily::Native => &self.native,
        }
    }

    /// 取得某个音源对应的实现。
    pub fn for_source(&self, source: &MusicSource) -> Result<&dyn SourceProvider> {
        source
            .family()
            .map(|family| self.for_family(family))
            .ok_or_else(|| {
                EngineError::Configuration(format!("无法识别的音源 ID: '{}'", source.id))
            })
    }

    /// 网易云兼容后端的实现，歌词模块也会用到。
    pub fn netease(&self) -> &NeteaseCompatible {
        &self.netease
    }

    /// vkeys v2 的实现，歌词模块也会用到。
    pub fn vkeys_v2(&self) -> &VkeysV2 {
        &self.vkeys_v2
    }

    /// Meting 的实现，歌词模块也会用到。
    pub fn meting(&self) -> &MetingProxy {
        &self.meting
    }

    /// 本地原生接口的实现。
    pub fn native(&self) -> &NativeSearch {
        &self.native
    }
}

/// 带上音源的超时与请求头发出请求，并要求 2xx。
pub(crate) async fn send(
    transport: &dyn HttpTransport,
    source: &MusicSource,
    request: HttpRequest,
) -> Result<HttpResponse> {
    let request = request.timeout(source.timeout()).headers(&source.headers);
    let response = transport.execute(request).await?;
    if !response.is_success() {
        return Err(EngineError::upstream(
            &source.id,
            format!("HTTP 状态码 {}", response.status),
        ));
    }
    Ok(response)
}

/// 发出请求并把正文解析为 JSON。
pub(crate) async fn get_json(
    transport: &dyn HttpTransport,
    source: &MusicSource,
    request: HttpRequest,
) -> Result<Value> {
    let response = send(transport, source, request).await?;
    response
        .json::<Value>()
        .map_err(|e| EngineError::upstream(&source.id, format!("响应不是有效的 JSON: {e}")))
}

/// 检查响应信封中的业务码。
pub(crate) fn expect_code(source_id: &str, body: &Value, expected: i64) -> Result<()> {
    match body.get("code").and_then(value_as_i64) {
        Some(code) if code == expected => Ok(()),
        Some(code) => {
            let message = body
                .get("message")
                .or_else(|| body.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Err(EngineError::upstream(
                source_id,
                format!("业务码 {code} (期望 {expected}) {message}").trim_end().to_string(),
            ))
        }
        None => Err(EngineError::upstream(source_id, "响应缺少 code 字段")),
    }
}

/// 兼容数字和数字字符串。
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 秒数换算为毫秒，超出范围时为 0。
pub(crate) fn secs_to_ms(secs: u64) -> u64 {
    secs.checked_mul(1000).unwrap_or(0)
}

/// `分:秒` 换算为毫秒，超出范围时为 0。
pub(crate) fn min_sec_to_ms(minutes: u64, secs: u64) -> u64 {
    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(secs))
        .map_or(0, secs_to_ms)
}

/// 兼容数字和字符串形式的 ID。
pub(crate) fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
