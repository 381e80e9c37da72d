//! 急诊分诊服务器主程序

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use triage_admin::{bootstrap_logging, init_logging, ConfigManager, MetricsNotifier, TriageMetrics};
use triage_web::{AppState, WebServer};
use triage_workflow::{EscalationMonitor, LoggingNotifier, TriageService};

/// 分诊服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "triage-server")]
#[command(about = "急诊预检分诊与优先级候诊队列服务")]
struct Args {
    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 服务器端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long)]
    log_level: Option<String>,

    /// SLA超时检查间隔（秒）
    #[arg(long)]
    sweep_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 正式日志初始化前，配置加载阶段的日志先走临时订阅者
    let bootstrap = bootstrap_logging(args.log_level.as_deref());
    let manager = ConfigManager::new(args.config.as_deref())?;
    let mut config = manager.get_config().await;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(secs) = args.sweep_interval_secs {
        config.monitor.sweep_interval_secs = secs;
    }
    manager.update_config(config.clone()).await?;

    drop(bootstrap);
    init_logging(&config.logging)?;

    info!("启动分诊服务器...");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  检查间隔: {}s", config.monitor.sweep_interval_secs);
    info!(
        "  SLA天花板(分钟): {}/{}/{}/{}/{}",
        config.sla.emergency_minutes,
        config.sla.very_urgent_minutes,
        config.sla.urgent_minutes,
        config.sla.less_urgent_minutes,
        config.sla.non_urgent_minutes
    );

    let engine = config.build_engine()?;
    info!(
        "Classifier loaded with {} keyword rules and {} vital rules",
        engine.classifier().keyword_rule_count(),
        engine.classifier().vital_rule_count()
    );
    let service = TriageService::new(engine);
    let metrics = Arc::new(TriageMetrics::new().context("Failed to register metrics")?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut monitor = EscalationMonitor::new(service.clone())
        .with_notifier(Arc::new(LoggingNotifier))
        .with_notifier(Arc::new(MetricsNotifier::new(metrics.clone())))
        .with_interval(config.monitor.sweep_interval());
    match config.monitor.closed_retention() {
        Some(retention) => monitor = monitor.with_closed_retention(retention),
        None => error!("Closed record retention is out of range, pruning disabled"),
    }
    let monitor_handle = monitor.spawn(shutdown_rx);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let server = WebServer::new(addr, AppState::new(service, metrics), config.server.enable_cors);

    // 发送方随关闭信号 future 一起释放，服务器异常退出时监控器也会停止
    let shutdown_signal = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到关闭信号，正在停止..."),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(true);
    };
    let result = server.run(shutdown_signal).await;

    if let Err(e) = monitor_handle.await {
        error!("Escalation monitor task failed: {}", e);
    }

    if let Err(e) = &result {
        error!("服务器运行失败: {}", e);
    }
    result
}
