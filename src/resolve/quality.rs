//! vkeys v3 的音质协商。
//!
//! v3 只提供各档音质的文件大小，不提供链接。
//! 先按请求的音质排出优先级，再挑出真正有文件的档位，逐个交给 v2 取链接。

use crate::providers::vkeys::models::QualityTier;

/// 从高到低的降级顺序。
pub const FALLBACK_ORDER: [u32; 17] = [16, 15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0];

/// 降级顺序之后兜底的档位。
pub const SAFETY_TIERS: [u32; 3] = [8, 4, 0];

/// 一次协商的输入与结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualitySelection {
    /// 请求的音质。
    pub requested: Option<u32>,
    /// 上游报告的音质列表。
    pub available: Vec<QualityTier>,
    /// 按优先级排列、且文件大小大于 0 的档位。
    pub candidates: Vec<u32>,
}

impl QualitySelection {
    /// 根据请求与可用列表进行协商。
    ///
    /// `fallback_quality` 在未指定请求音质时使用。
    pub fn negotiate(requested: Option<u32>, fallback_quality: u32, available: Vec<QualityTier>) -> Self {
        let priority = priority_list(requested.unwrap_or(fallback_quality));
        let candidates = priority
            .into_iter()
            .filter(|tier| size_of(&available, *tier) > 0)
            .collect();
        Self {
            requested,
            available,
            candidates,
        }
    }

    /// 首选的档位。
    pub fn chosen(&self) -> Option<u32> {
        self.candidates.first().copied()
    }
}

/// 计算优先级列表：请求的档位，降级顺序中位于其后的档位，最后是兜底档位。去重并保持首次出现的顺序。
pub fn priority_list(requested: u32) -> Vec<u32> {
    let mut list = vec![requested];
    if let Some(pos) = FALLBACK_ORDER.iter().position(|&t| t == requested) {
        list.extend_from_slice(&FALLBACK_ORDER[pos + 1..]);
    }
    list.extend_from_slice(&SAFETY_TIERS);

    let mut seen = Vec::with_capacity(list.len());
    list.retain(|tier| {
        if seen.contains(tier) {
            false
        } else {
            seen.push(*tier);
            true
        }
    });
    list
}

/// 列表中缺失的档位视为大小 0。
fn size_of(available: &[QualityTier], tier: u32) -> u64 {
    available
        .iter()
        .find(|q| q.tier == tier)
        .map(|q| q.size)
        .unwrap_or(0)
}
