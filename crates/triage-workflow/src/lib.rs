//! # 急诊分诊工作流模块
//!
//! 提供急诊预检分诊的核心功能，包括：
//! - 分诊判定：根据主诉和生命体征给出 Manchester 分诊等级
//! - 就诊状态机：管理就诊记录从到达到接诊的状态转换
//! - 候诊队列：按等级和到达时间排序，支持并发安全的接诊
//! - 超时升级：候诊时间超出等级天花板时发出升级事件

pub mod classifier;
pub mod clock;
pub mod engine;
pub mod escalation;
pub mod queue;
pub mod service;
pub mod state_machine;

// 重新导出主要类型
pub use classifier::{AcuityClassifier, ClassifierConfig, Comparison, KeywordRule, VitalRule};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{QueueStats, TriageEngine, TriageRequest};
pub use escalation::{EscalationMonitor, EscalationNotifier, LoggingNotifier};
pub use queue::{QueueEntry, TriageQueue};
pub use service::TriageService;
pub use state_machine::IntakeStateMachine;
