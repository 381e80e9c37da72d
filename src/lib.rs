//! 急诊预检分诊与优先级候诊队列
//!
//! 汇总导出核心类型和工作流引擎，供演示程序和嵌入式使用。

pub use triage_core::{AcuityLevel, EscalationEvent, IntakeRecord, IntakeStatus, SlaPolicy, TriageError, VitalSigns};
pub use triage_workflow::{AcuityClassifier, ClassifierConfig, TriageEngine, TriageRequest, TriageService};
