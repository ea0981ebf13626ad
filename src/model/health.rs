//! 音源健康状态的数据结构。

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

/// 音源最近一次尝试的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthStatus {
    /// 最近一次调用成功。
    Online,
    /// 最近一次调用失败。
    Error,
    /// 尚未调用过。
    #[default]
    Unknown,
}

/// 单个音源的最近状态，每次尝试都会整体覆盖。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    /// 音源 ID。
    pub source_id: String,
    /// 状态。
    pub status: HealthStatus,
    /// 记录时间。未调用过时为 `None`。
    pub last_checked_at: Option<DateTime<Utc>>,
    /// 最近一次的错误信息。
    pub last_error_message: Option<String>,
    /// 最近一次的响应耗时（毫秒）。
    pub last_response_time_ms: Option<u64>,
}

impl SourceStatus {
    /// 一个从未被调用过的音源的状态。
    pub fn unknown(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            status: HealthStatus::Unknown,
            last_checked_at: None,
            last_error_message: None,
            last_response_time_ms: None,
        }
    }
}

/// 所有已配置音源的状态汇总。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    /// 已配置的音源总数。
    pub total: usize,
    /// 在线数。
    pub online: usize,
    /// 不在线数（`total - online`）。
    pub offline: usize,
    /// 最近一次失败的数量。
    pub error: usize,
    /// 从未调用过的数量。
    pub unknown: usize,
}
