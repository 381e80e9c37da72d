//! SLA超时升级监控
//!
//! 按固定周期检查候诊记录的等待时长，超出等级天花板时产生升级事件并交给通知方。
//! 升级只是提醒，不会自动修改分诊等级。

use crate::service::TriageService;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use triage_core::utils::format_wait;
use triage_core::EscalationEvent;

/// 默认检查周期
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// 升级事件通知方特征
#[async_trait::async_trait]
pub trait EscalationNotifier {
    /// 发送升级通知
    async fn notify(&self, event: &EscalationEvent) -> Result<()>;
}

/// 只记录日志的通知方
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait::async_trait]
impl EscalationNotifier for LoggingNotifier {
    async fn notify(&self, event: &EscalationEvent) -> Result<()> {
        tracing::warn!(
            intake_id = %event.intake_id,
            patient_id = %event.patient_id,
            acuity = ?event.acuity,
            "Triage SLA exceeded by {}",
            format_wait(event.overrun())
        );
        Ok(())
    }
}

/// SLA超时监控器
pub struct EscalationMonitor {
    service: TriageService,
    notifiers: Vec<Arc<dyn EscalationNotifier + Send + Sync>>,
    interval: Duration,
    closed_retention: Option<chrono::Duration>,
}

impl std::fmt::Debug for EscalationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationMonitor")
            .field("notifiers_count", &self.notifiers.len())
            .field("interval", &self.interval)
            .field("closed_retention", &self.closed_retention)
            .finish()
    }
}

impl EscalationMonitor {
    /// 创建新的监控器
    pub fn new(service: TriageService) -> Self {
        Self {
            service,
            notifiers: Vec::new(),
            interval: DEFAULT_SWEEP_INTERVAL,
            closed_retention: None,
        }
    }

    /// 添加通知方
    pub fn with_notifier(mut self, notifier: Arc<dyn EscalationNotifier + Send + Sync>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// 设置检查周期
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// 检查时顺带清理结束超过 retention 的记录
    pub fn with_closed_retention(mut self, retention: chrono::Duration) -> Self {
        self.closed_retention = Some(retention);
        self
    }

    /// 执行一次检查并发送通知
    ///
    /// 检查在写锁下完成，通知在释放锁之后发送；通知失败只记录日志。
    pub async fn run_once(&self) -> Vec<EscalationEvent> {
        let events = self.service.sweep().await;

        for event in &events {
            for notifier in &self.notifiers {
                if let Err(e) = notifier.notify(event).await {
                    tracing::error!("Failed to deliver escalation {} for intake {}: {}", event.id, event.intake_id, e);
                }
            }
        }

        if let Some(retention) = self.closed_retention {
            self.service.prune_closed(retention).await;
        }

        events
    }

    /// 周期运行，直到收到关闭信号
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Starting escalation monitor with interval {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let events = self.run_once().await;
                    if !events.is_empty() {
                        tracing::info!("Escalation sweep raised {} events", events.len());
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Escalation monitor stopped");
    }

    /// 在后台任务中运行
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{AcuityClassifier, ClassifierConfig};
    use crate::clock::ManualClock;
    use crate::engine::{TriageEngine, TriageRequest};
    use chrono::Utc;
    use tokio::sync::Mutex;
    use triage_core::{AcuityLevel, SlaPolicy};
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<EscalationEvent>>,
    }

    #[async_trait::async_trait]
    impl EscalationNotifier for RecordingNotifier {
        async fn notify(&self, event: &EscalationEvent) -> Result<()> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl EscalationNotifier for FailingNotifier {
        async fn notify(&self, _event: &EscalationEvent) -> Result<()> {
            Err(anyhow::anyhow!("pager gateway unavailable"))
        }
    }

    async fn setup(level: AcuityLevel) -> (TriageService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let classifier = AcuityClassifier::new(ClassifierConfig::default()).unwrap();
        let service = TriageService::with_clock(TriageEngine::new(classifier, SlaPolicy::default()), clock.clone());

        let record = service.register_arrival(Uuid::new_v4(), "walk-in").await;
        let request = TriageRequest {
            override_level: Some(level),
            ..Default::default()
        };
        service.triage(record.id, request).await.unwrap();
        (service, clock)
    }

    #[tokio::test]
    async fn test_run_once_notifies_each_event_once() {
        let (service, clock) = setup(AcuityLevel::Urgent).await;
        let recorder = Arc::new(RecordingNotifier::default());
        let monitor = EscalationMonitor::new(service).with_notifier(recorder.clone());

        clock.advance(chrono::Duration::minutes(59));
        assert!(monitor.run_once().await.is_empty());

        clock.advance(chrono::Duration::minutes(2));
        assert_eq!(monitor.run_once().await.len(), 1);

        // 不规则的调用间隔不影响结果
        clock.advance(chrono::Duration::seconds(5));
        assert!(monitor.run_once().await.is_empty());
        clock.advance(chrono::Duration::hours(3));
        assert!(monitor.run_once().await.is_empty());

        assert_eq!(recorder.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_stop_sweep() {
        let (service, clock) = setup(AcuityLevel::Emergency).await;
        let recorder = Arc::new(RecordingNotifier::default());
        let monitor = EscalationMonitor::new(service.clone())
            .with_notifier(Arc::new(FailingNotifier))
            .with_notifier(recorder.clone());

        clock.advance(chrono::Duration::seconds(1));
        let events = monitor.run_once().await;
        assert_eq!(events.len(), 1);
        assert_eq!(recorder.events.lock().await.len(), 1);
        assert_eq!(service.escalations(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_records_pruned_during_sweep() {
        let (service, clock) = setup(AcuityLevel::Urgent).await;
        let claimed = service.claim(Uuid::new_v4()).await.unwrap().unwrap();
        service.complete(claimed.id).await.unwrap();

        let monitor = EscalationMonitor::new(service.clone()).with_closed_retention(chrono::Duration::hours(1));
        clock.advance(chrono::Duration::hours(2));
        monitor.run_once().await;

        assert!(service.get(claimed.id).await.is_err());
    }

    #[tokio::test]
    async fn test_monitor_stops_on_shutdown() {
        let (service, clock) = setup(AcuityLevel::VeryUrgent).await;
        clock.advance(chrono::Duration::minutes(11));

        let recorder = Arc::new(RecordingNotifier::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = EscalationMonitor::new(service)
            .with_notifier(recorder.clone())
            .with_interval(Duration::from_millis(10))
            .spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(recorder.events.lock().await.len(), 1);
    }
}
