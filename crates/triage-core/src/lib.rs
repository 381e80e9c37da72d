//! # Triage Core
//!
//! 急诊预检分诊系统的核心模块，提供基础数据结构、错误定义、SLA策略和通用工具。

pub mod error;
pub mod models;
pub mod sla;
pub mod utils;

pub use error::{Result, TriageError};
pub use models::*;
pub use sla::SlaPolicy;
