//! 音源健康状态记录。
//!
//! 每个音源只保留最近一次尝试的结果，后写覆盖先写，不保留历史。

use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use crate::model::health::{HealthStatus, HealthSummary, SourceStatus};

/// 进程内的健康状态表。
#[derive(Debug)]
pub struct HealthTracker {
    /// 已配置的音源 ID，决定 `all()` 的顺序与汇总中的总数。
    source_ids: Vec<String>,
    statuses: DashMap<String, SourceStatus>,
}

impl HealthTracker {
    /// 以已配置的音源列表创建。
    pub fn new(source_ids: Vec<String>) -> Self {
        Self {
            source_ids,
            statuses: DashMap::new(),
        }
    }

    /// 记录一次尝试的结果。
    pub fn record(
        &self,
        source_id: &str,
        status: HealthStatus,
        message: Option<String>,
        response_time_ms: Option<u64>,
    ) {
        self.statuses.insert(
            source_id.to_string(),
            SourceStatus {
                source_id: source_id.to_string(),
                status,
                last_checked_at: Some(Utc::now()),
                last_error_message: message,
                last_response_time_ms: response_time_ms,
            },
        );
    }

    /// 记录一次成功。
    pub fn record_success(&self, source_id: &str, elapsed: Duration) {
        self.record(source_id, HealthStatus::Online, None, Some(millis(elapsed)));
    }

    /// 记录一次失败。
    pub fn record_failure(&self, source_id: &str, message: impl Into<String>, elapsed: Duration) {
        self.record(
            source_id,
            HealthStatus::Error,
            Some(message.into()),
            Some(millis(elapsed)),
        );
    }

    /// 查询某个音源的状态，从未尝试过的音源为 `Unknown`。
    pub fn get(&self, source_id: &str) -> SourceStatus {
        self.statuses
            .get(source_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| SourceStatus::unknown(source_id))
    }

    /// 所有已配置音源的状态，保持配置顺序。
    pub fn all(&self) -> Vec<SourceStatus> {
        self.source_ids.iter().map(|id| self.get(id)).collect()
    }

    /// 汇总。`offline` 为总数减去在线数。
    pub fn summary(&self) -> HealthSummary {
        let mut summary = HealthSummary {
            total: self.source_ids.len(),
            ..Default::default()
        };
        for status in self.all() {
            match status.status {
                HealthStatus::Online => summary.online += 1,
                HealthStatus::Error => summary.error += 1,
                HealthStatus::Unknown => summary.unknown += 1,
            }
        }
        summary.offline = summary.total - summary.online;
        summary
    }

    /// 清空所有记录。
    pub fn reset(&self) {
        self.statuses.clear();
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
