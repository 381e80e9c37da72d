//! # 分诊系统管理模块
//!
//! - 配置管理：TOML 文件 + 环境变量，带校验
//! - 日志初始化
//! - 运行监控：Prometheus 指标和健康状态

pub mod config;
pub mod logging;
pub mod monitoring;

pub use config::{ConfigManager, ConfigValidator, LogFormat, LoggingConfig, MonitorConfig, ServerConfig, TriageConfig};
pub use logging::{bootstrap_logging, init_logging};
pub use monitoring::{HealthLevel, HealthStatus, MetricsNotifier, TriageMetrics};
