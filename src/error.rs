//! 定义了整个引擎的错误类型 `EngineError`。

use std::{fmt, io};
use thiserror::Error;

/// 单个音源的一次失败尝试。
///
/// 在回退链中，每个失败的音源都会留下一条记录，
/// 最终随 [`EngineError::AllSourcesExhausted`] 一起返回给调用方用于诊断。
#[derive(Debug)]
pub struct AttemptError {
    /// 失败音源的 ID。
    pub source_id: String,
    /// 该音源失败的具体原因。
    pub error: EngineError,
}

impl AttemptError {
    /// 创建一条失败记录。
    pub fn new(source_id: impl Into<String>, error: EngineError) -> Self {
        Self {
            source_id: source_id.into(),
            error,
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source_id, self.error)
    }
}

/// 引擎的通用错误枚举。
#[derive(Error, Debug)]
pub enum EngineError {
    /// 网络层错误，包括连接失败与超时。
    #[error("网络请求失败: {0}")]
    Transport(String),

    /// 网络请求失败 (源自 `reqwest::Error`)
    #[error("网络请求失败: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// 上游返回了非成功状态码，或响应信封格式不对。
    #[error("音源 `{source_id}` 返回错误: {message}")]
    Upstream {
        /// 出错的音源 ID。
        source_id: String,
        /// 错误描述。
        message: String,
    },

    /// 响应结构与预期不符，无法规范化为 `Track`。
    #[error("音源 `{provider_id}` 的响应无法解析: {reason}")]
    Normalization {
        /// 出错的音源 ID。
        provider_id: String,
        /// 失败原因。
        reason: String,
    },

    /// 解析出的播放链接不可用。
    #[error("播放链接校验失败: {0}")]
    ValidationFailed(String),

    /// 回退链中的所有音源都失败了。
    #[error("所有音源均失败: {}", join_attempts(.attempts))]
    AllSourcesExhausted {
        /// 按尝试顺序排列的失败记录。
        attempts: Vec<AttemptError>,
    },

    /// 调用方已取消本次操作。
    #[error("操作已取消")]
    Cancelled,

    /// 配置问题，例如没有任何已启用的音源支持请求的平台。
    #[error("配置错误: {0}")]
    Configuration(String),

    /// JSON 解析失败 (源自 `serde_json::Error`)
    #[error("JSON 解析失败: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// I/O 错误 (源自 `io::Error`)
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// 构造一个 `Upstream` 错误。
    pub fn upstream(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// 构造一个 `Normalization` 错误。
    pub fn normalization(provider_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Normalization {
            provider_id: provider_id.into(),
            reason: reason.into(),
        }
    }

    /// 是否为网络层错误。
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Reqwest(_))
    }

    /// 若为 `AllSourcesExhausted`，返回其中的失败记录。
    pub fn attempts(&self) -> Option<&[AttemptError]> {
        match self {
            Self::AllSourcesExhausted { attempts } => Some(attempts),
            _ => None,
        }
    }
}

fn join_attempts(attempts: &[AttemptError]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// `EngineError` 的 `Result` 类型别名，方便在函数签名中使用。
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_error_lists_attempts_in_order() {
        let err = EngineError::AllSourcesExhausted {
            attempts: vec![
                AttemptError::new("netease-backup-1", EngineError::Transport("超时".into())),
                AttemptError::new("vkeys-v2", EngineError::upstream("vkeys-v2", "code 500")),
            ],
        };

        let text = err.to_string();
        let first = text.find("netease-backup-1").unwrap();
        let second = text.find("[vkeys-v2]").unwrap();
        assert!(first < second);
        assert_eq!(err.attempts().map(<[_]>::len), Some(2));
    }

    #[test]
    fn transport_classification() {
        assert!(EngineError::Transport("x".into()).is_transport());
        assert!(!EngineError::Cancelled.is_transport());
    }
}
