//! 就诊记录状态机
//!
//! 管理急诊就诊记录从到达到离开候诊队列的状态转换

use triage_core::{IntakeEvent, IntakeStatus, Result, TriageError};

/// 就诊记录状态机
#[derive(Debug, Default, Clone, Copy)]
pub struct IntakeStateMachine;

impl IntakeStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        Self
    }

    /// 执行状态转换
    pub fn transition(&self, from: IntakeStatus, event: IntakeEvent) -> Result<IntakeStatus> {
        use IntakeEvent as E;
        use IntakeStatus as S;

        let to = match (from, event) {
            (S::AwaitingTriage, E::Triage) => Some(S::Triaged),
            // 重新分诊
            (S::Triaged, E::Triage) => Some(S::Triaged),
            (S::Triaged, E::Claim) => Some(S::InService),
            (S::InService, E::Complete) => Some(S::Completed),
            (S::AwaitingTriage, E::Cancel) | (S::Triaged, E::Cancel) => Some(S::Cancelled),
            (S::AwaitingTriage, E::Claim | E::Complete)
            | (S::Triaged, E::Complete)
            | (S::InService, E::Triage | E::Claim | E::Cancel)
            | (S::Completed, _)
            | (S::Cancelled, _) => None,
        };

        to.ok_or(TriageError::InvalidTransition { from, event })
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: IntakeStatus, event: IntakeEvent) -> bool {
        self.transition(from, event).is_ok()
    }

    /// 获取所有可能的状态
    pub fn get_all_states() -> Vec<IntakeStatus> {
        vec![
            IntakeStatus::AwaitingTriage,
            IntakeStatus::Triaged,
            IntakeStatus::InService,
            IntakeStatus::Completed,
            IntakeStatus::Cancelled,
        ]
    }

    /// 获取状态的所有可能事件
    pub fn get_possible_events(&self, current_state: IntakeStatus) -> Vec<IntakeEvent> {
        [
            IntakeEvent::Triage,
            IntakeEvent::Claim,
            IntakeEvent::Complete,
            IntakeEvent::Cancel,
        ]
        .into_iter()
        .filter(|event| self.can_transition(current_state, *event))
        .collect()
    }
}
