//! 配置管理
//!
//! 从 TOML 文件和 `TRIAGE_` 前缀的环境变量加载配置，支持校验和保存

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};
use triage_core::SlaPolicy;
use triage_workflow::{AcuityClassifier, ClassifierConfig, TriageEngine};

/// 已结束记录最长保留时间（分钟），一年
pub const MAX_CLOSED_RETENTION_MINUTES: u64 = 365 * 24 * 60;

/// 分诊系统完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 各等级最长候诊时间
    pub sla: SlaPolicy,
    /// 超时监控配置
    pub monitor: MonitorConfig,
    /// 分诊规则
    pub classifier: ClassifierConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 启用CORS
    pub enable_cors: bool,
}

/// 超时监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 检查间隔（秒）
    pub sweep_interval_secs: u64,
    /// 升级事件保留条数
    pub escalation_history_limit: usize,
    /// 已结束记录保留时间（分钟）
    pub closed_retention_minutes: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或 EnvFilter 指令
    pub level: String,
    /// 输出格式
    pub format: LogFormat,
    /// 是否输出 target
    pub with_target: bool,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            escalation_history_limit: triage_workflow::engine::DEFAULT_ESCALATION_HISTORY,
            closed_retention_minutes: 24 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            with_target: true,
        }
    }
}

impl MonitorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 超出 chrono 可表示范围时返回 None
    pub fn closed_retention(&self) -> Option<chrono::Duration> {
        let minutes = i64::try_from(self.closed_retention_minutes).ok()?;
        chrono::Duration::try_minutes(minutes)
    }
}

impl TriageConfig {
    /// 按配置构建分诊引擎
    pub fn build_engine(&self) -> Result<TriageEngine> {
        let classifier = AcuityClassifier::new(self.classifier.clone())
            .context("Failed to compile classifier rules")?;
        self.sla.validate().context("Invalid SLA policy")?;

        Ok(TriageEngine::new(classifier, self.sla.clone())
            .with_history_limit(self.monitor.escalation_history_limit))
    }
}

/// 配置校验规则
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&TriageConfig) -> Result<()>,
}

/// 配置校验器
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

impl std::fmt::Debug for ConfigValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigValidator")
            .field("rules_count", &self.validation_rules.len())
            .finish()
    }
}

impl ConfigValidator {
    /// 创建新的配置校验器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err(anyhow::anyhow!("Server port cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "sla",
                validator: |config| config.sla.validate().map_err(anyhow::Error::from),
            },
            ValidationRule {
                field_path: "monitor.sweep_interval_secs",
                validator: |config| {
                    if config.monitor.sweep_interval_secs == 0 {
                        Err(anyhow::anyhow!("Sweep interval must be at least 1 second"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "monitor.escalation_history_limit",
                validator: |config| {
                    if config.monitor.escalation_history_limit == 0 {
                        Err(anyhow::anyhow!("Escalation history limit must be at least 1"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "monitor.closed_retention_minutes",
                validator: |config| {
                    if config.monitor.closed_retention_minutes > MAX_CLOSED_RETENTION_MINUTES {
                        Err(anyhow::anyhow!(
                            "Closed record retention cannot exceed {} minutes",
                            MAX_CLOSED_RETENTION_MINUTES
                        ))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "classifier",
                validator: |config| {
                    AcuityClassifier::new(config.classifier.clone())
                        .map(|_| ())
                        .map_err(anyhow::Error::from)
                },
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    if config.logging.level.trim().is_empty() {
                        Err(anyhow::anyhow!("Log level cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 校验配置
    pub fn validate(&self, config: &TriageConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("Invalid {}: {}", rule.field_path, e));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    /// 配置数据
    config: Arc<RwLock<TriageConfig>>,
    /// 配置文件路径
    config_path: Option<String>,
    /// 配置校验器
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 从文件（可选）和环境变量加载配置
    pub fn new(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        let config = Self::finish(builder)?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("No configuration file given, using defaults and environment"),
        }

        Self::from_config(config, config_path.map(str::to_string))
    }

    /// 从 TOML 文本加载配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(content, FileFormat::Toml));
        let config = Self::finish(builder)?;
        Self::from_config(config, None)
    }

    /// 使用现成的配置
    pub fn from_config(config: TriageConfig, config_path: Option<String>) -> Result<Self> {
        let validator = ConfigValidator::new();
        validator.validate(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
            validator,
        })
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<TriageConfig> {
        let settings = builder
            .add_source(
                Environment::with_prefix("TRIAGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// 获取配置
    pub async fn get_config(&self) -> TriageConfig {
        let config = self.config.read().await;
        config.clone()
    }

    /// 更新配置
    pub async fn update_config(&self, new_config: TriageConfig) -> Result<()> {
        self.validator.validate(&new_config)?;

        {
            let mut config = self.config.write().await;
            *config = new_config;
        }

        info!("Configuration updated successfully");
        Ok(())
    }

    /// 保存配置到文件
    pub async fn save_config(&self, path: Option<&str>) -> Result<()> {
        let path = path
            .or(self.config_path.as_deref())
            .ok_or_else(|| anyhow::anyhow!("No configuration file path to save to"))?;

        let config_str = {
            let config = self.config.read().await;
            toml::to_string_pretty(&*config).context("Failed to serialize configuration")?
        };

        tokio::fs::write(path, config_str)
            .await
            .context("Failed to write configuration file")?;

        info!("Configuration saved to: {}", path);
        Ok(())
    }

    /// 重新加载配置文件
    pub async fn reload_config(&self) -> Result<()> {
        let path = self
            .config_path
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No configuration file to reload"))?;
        let new_config = Self::finish(Config::builder().add_source(File::with_name(path)))?;
        self.update_config(new_config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use triage_core::AcuityLevel;

    // 读取 TRIAGE_ 环境变量的用例串行执行
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_are_valid() {
        let config = TriageConfig::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.monitor.sweep_interval(), Duration::from_secs(30));
        assert!(config.build_engine().is_ok());
    }

    #[tokio::test]
    async fn test_partial_toml_keeps_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let manager = ConfigManager::from_toml_str(
            r#"
            [server]
            port = 9090

            [sla]
            urgent_minutes = 45

            [classifier]
            default_level = "LessUrgent"

            [[classifier.keyword_rules]]
            pattern = "snake bite"
            level = "VeryUrgent"
            "#,
        )
        .unwrap();

        let config = manager.get_config().await;
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.sla.urgent_minutes, 45);
        assert_eq!(config.sla.very_urgent_minutes, 10);
        assert_eq!(config.classifier.default_level, AcuityLevel::LessUrgent);
        assert_eq!(config.classifier.keyword_rules.len(), 1);

        let classifier = AcuityClassifier::new(config.classifier.clone()).unwrap();
        assert_eq!(classifier.classify("Snake bite on left leg", None), AcuityLevel::VeryUrgent);
    }

    #[test]
    fn test_invalid_sla_rejected() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let result = ConfigManager::from_toml_str(
            r#"
            [sla]
            emergency_minutes = 30
            very_urgent_minutes = 10
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_keyword_pattern_rejected() {
        let mut config = TriageConfig::default();
        config.classifier.keyword_rules = vec![triage_workflow::KeywordRule::new("([", AcuityLevel::Urgent)];
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_config() {
        let manager = ConfigManager::from_config(TriageConfig::default(), None).unwrap();

        let mut bad = TriageConfig::default();
        bad.monitor.sweep_interval_secs = 0;
        assert!(manager.update_config(bad).await.is_err());
        assert_eq!(manager.get_config().await.monitor.sweep_interval_secs, 30);

        assert!(manager.save_config(None).await.is_err());
    }

    #[tokio::test]
    async fn test_environment_overrides_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("TRIAGE_SERVER__PORT", "9191");
        std::env::set_var("TRIAGE_SLA__URGENT_MINUTES", "45");

        let result = ConfigManager::from_toml_str(
            r#"
            [server]
            port = 8081
            "#,
        );

        std::env::remove_var("TRIAGE_SERVER__PORT");
        std::env::remove_var("TRIAGE_SLA__URGENT_MINUTES");

        let config = result.unwrap().get_config().await;
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.sla.urgent_minutes, 45);
        assert_eq!(config.sla.less_urgent_minutes, 120);
    }

    #[test]
    fn test_retention_beyond_limit_rejected() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let result = ConfigManager::from_toml_str(
            r#"
            [monitor]
            closed_retention_minutes = 1000000000000
            "#,
        );
        assert!(result.is_err());

        let mut config = TriageConfig::default();
        config.monitor.closed_retention_minutes = MAX_CLOSED_RETENTION_MINUTES;
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(
            config.monitor.closed_retention(),
            Some(chrono::Duration::days(365))
        );

        config.monitor.closed_retention_minutes = 200_000_000_000_000;
        assert!(config.monitor.closed_retention().is_none());
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_zero_history_limit_rejected() {
        let mut config = TriageConfig::default();
        config.monitor.escalation_history_limit = 0;
        assert!(ConfigValidator::new().validate(&config).is_err());
    }
}
