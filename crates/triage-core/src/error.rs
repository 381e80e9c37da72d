//! 错误定义模块

use crate::models::{IntakeEvent, IntakeStatus};
use thiserror::Error;
use uuid::Uuid;

/// 分诊系统统一错误类型
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("无效状态转换: 当前状态 {from}, 尝试事件 {event}")]
    InvalidTransition { from: IntakeStatus, event: IntakeEvent },

    #[error("就诊记录 {0} 尚未完成分诊，不能进入候诊队列")]
    NotTriaged(Uuid),

    #[error("就诊记录 {0} 已在候诊队列中")]
    AlreadyQueued(Uuid),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TriageError {
    /// 针对就诊记录的 NotFound 错误
    pub fn intake_not_found(id: Uuid) -> Self {
        TriageError::NotFound(format!("Intake record {} not found", id))
    }
}

/// 分诊系统统一结果类型
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_names_both_sides() {
        let err = TriageError::InvalidTransition {
            from: IntakeStatus::AwaitingTriage,
            event: IntakeEvent::Claim,
        };
        let message = err.to_string();
        assert!(message.contains("AwaitingTriage"));
        assert!(message.contains("Claim"));
    }
}
