//! 日志初始化

use crate::config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// 构建日志过滤器；设置了 `RUST_LOG` 时以其为准
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(config.level.trim())
            .with_context(|| format!("Invalid log filter: {}", config.level)),
    }
}

/// 安装全局 tracing 订阅者
///
/// 重复调用会返回错误，不会替换已安装的订阅者。
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// 配置加载前使用的临时订阅者，只对当前线程生效，guard 释放后失效
pub fn bootstrap_logging(level: Option<&str>) -> DefaultGuard {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_default(subscriber)
}
