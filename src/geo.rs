//! 部署地区探测。
//!
//! 只关心“是否在中国大陆”。配置可以直接指定结果；
//! 自动模式下首次需要时请求一次探测接口，成功的结果缓存到 `reset()` 为止，失败不缓存。

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    config::RegionMode,
    http::{HttpRequest, HttpTransport},
};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 从探测接口的正文中解析国家代码。
///
/// 支持 JSON 对象中的 `countryCode`、`country_code`、`country` 字段，
/// 或者正文本身就是两位字母代码。
pub fn parse_country(body: &str) -> Option<String> {
    let body = body.trim();
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return ["countryCode", "country_code", "country"]
            .iter()
            .find_map(|k| value.get(*k).and_then(Value::as_str))
            .map(|c| c.trim().to_ascii_uppercase());
    }
    (body.len() == 2 && body.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| body.to_ascii_uppercase())
}

/// 地区探测器。
pub struct GeoDetector {
    transport: Arc<dyn HttpTransport>,
    mode: RegionMode,
    probe_url: String,
    cached: Mutex<Option<bool>>,
}

impl GeoDetector {
    /// 创建探测器。
    pub fn new(transport: Arc<dyn HttpTransport>, mode: RegionMode, probe_url: String) -> Self {
        Self {
            transport,
            mode,
            probe_url,
            cached: Mutex::new(None),
        }
    }

    fn cached(&self) -> Option<bool> {
        self.cached.lock().ok().and_then(|guard| *guard)
    }

    /// 是否部署在中国大陆。探测失败时视为否。
    pub async fn is_china(&self) -> bool {
        match self.mode {
            RegionMode::China => return true,
            RegionMode::Overseas => return false,
            RegionMode::Auto => {}
        }
        if let Some(answer) = self.cached() {
            return answer;
        }

        let request = HttpRequest::get(self.probe_url.clone()).timeout(PROBE_TIMEOUT);
        let country = match self.transport.execute(request).await {
            Ok(response) if response.is_success() => parse_country(&response.body),
            Ok(response) => {
                warn!("[Geo] 地区探测返回状态码 {}", response.status);
                None
            }
            Err(e) => {
                warn!("[Geo] 地区探测失败: {}", e);
                None
            }
        };

        let Some(country) = country else {
            return false;
        };
        let answer = country == "CN";
        info!("[Geo] 探测到部署地区 {}，{}使用原生接口", country, if answer { "" } else { "不" });
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(answer);
        }
        answer
    }

    /// 清除缓存的探测结果。
    pub fn reset(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
    }
}
