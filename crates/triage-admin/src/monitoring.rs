//! 运行监控
//!
//! 候诊队列的 Prometheus 指标和健康状态

use anyhow::Result;
use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use triage_core::{AcuityLevel, EscalationEvent};
use triage_workflow::{EscalationNotifier, QueueStats};

/// 候诊时长直方图分桶（秒）
const WAIT_BUCKETS: &[f64] = &[60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0, 14400.0, 28800.0];

fn level_label(level: AcuityLevel) -> &'static str {
    match level {
        AcuityLevel::Emergency => "Emergency",
        AcuityLevel::VeryUrgent => "VeryUrgent",
        AcuityLevel::Urgent => "Urgent",
        AcuityLevel::LessUrgent => "LessUrgent",
        AcuityLevel::NonUrgent => "NonUrgent",
    }
}

/// 分诊指标收集器
pub struct TriageMetrics {
    /// Prometheus指标注册表
    registry: Registry,
    /// 各等级候诊人数
    waiting_records: IntGaugeVec,
    /// 等待分诊人数
    awaiting_triage: IntGauge,
    /// 接诊中人数
    in_service: IntGauge,
    /// 各等级升级事件数
    escalations_total: IntCounterVec,
    /// 接诊次数
    claims_total: IntCounter,
    /// 接诊时的候诊时长
    wait_at_claim: Histogram,
    /// 启动时间
    started_at: Instant,
}

impl std::fmt::Debug for TriageMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageMetrics")
            .field("claims_total", &self.claims_total.get())
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// 服务健康状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthLevel,
    pub waiting: usize,
    pub escalated_waiting: usize,
    pub uptime: Duration,
    pub timestamp: DateTime<Utc>,
}

/// 健康等级
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HealthLevel {
    Healthy,
    /// 有候诊者已超时
    Degraded,
}

impl TriageMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let waiting_records = IntGaugeVec::new(
            Opts::new("triage_waiting_records", "Triaged records waiting to be claimed"),
            &["level"],
        )?;
        let awaiting_triage = IntGauge::with_opts(Opts::new(
            "triage_awaiting_triage_records",
            "Registered records not yet triaged",
        ))?;
        let in_service = IntGauge::with_opts(Opts::new("triage_in_service_records", "Records currently in service"))?;
        let escalations_total = IntCounterVec::new(
            Opts::new("triage_escalations_total", "SLA escalations raised"),
            &["level"],
        )?;
        let claims_total = IntCounter::with_opts(Opts::new("triage_claims_total", "Records claimed by clinicians"))?;
        let wait_at_claim = Histogram::with_opts(
            HistogramOpts::new("triage_wait_at_claim_seconds", "Time from arrival to claim in seconds")
                .buckets(WAIT_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(waiting_records.clone()))?;
        registry.register(Box::new(awaiting_triage.clone()))?;
        registry.register(Box::new(in_service.clone()))?;
        registry.register(Box::new(escalations_total.clone()))?;
        registry.register(Box::new(claims_total.clone()))?;
        registry.register(Box::new(wait_at_claim.clone()))?;

        for level in AcuityLevel::ALL {
            waiting_records.with_label_values(&[level_label(level)]).set(0);
            escalations_total.with_label_values(&[level_label(level)]);
        }

        Ok(Self {
            registry,
            waiting_records,
            awaiting_triage,
            in_service,
            escalations_total,
            claims_total,
            wait_at_claim,
            started_at: Instant::now(),
        })
    }

    /// 用队列统计刷新仪表
    pub fn observe_stats(&self, stats: &QueueStats) {
        for level in AcuityLevel::ALL {
            let count = stats.waiting_by_level.get(&level).copied().unwrap_or(0);
            self.waiting_records
                .with_label_values(&[level_label(level)])
                .set(count as i64);
        }
        self.awaiting_triage.set(stats.awaiting_triage as i64);
        self.in_service.set(stats.in_service as i64);
    }

    /// 记录一次接诊
    pub fn record_claim(&self, waited: chrono::Duration) {
        self.claims_total.inc();
        self.wait_at_claim
            .observe(waited.num_milliseconds().max(0) as f64 / 1000.0);
    }

    /// 记录一次升级
    pub fn record_escalation(&self, level: AcuityLevel) {
        self.escalations_total.with_label_values(&[level_label(level)]).inc();
    }

    pub fn escalation_count(&self, level: AcuityLevel) -> u64 {
        self.escalations_total.with_label_values(&[level_label(level)]).get()
    }

    pub fn claim_count(&self) -> u64 {
        self.claims_total.get()
    }

    /// 根据队列统计给出健康状态，now 取自服务时钟
    pub fn health(&self, stats: &QueueStats, now: DateTime<Utc>) -> HealthStatus {
        let status = if stats.escalated_waiting > 0 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };

        HealthStatus {
            status,
            waiting: stats.waiting,
            escalated_waiting: stats.escalated_waiting,
            uptime: self.started_at.elapsed(),
            timestamp: now,
        }
    }

    /// 导出Prometheus文本格式指标
    pub fn render(&self) -> Result<String> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}

/// 把升级事件计入指标的通知方
#[derive(Debug, Clone)]
pub struct MetricsNotifier {
    metrics: Arc<TriageMetrics>,
}

impl MetricsNotifier {
    pub fn new(metrics: Arc<TriageMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait::async_trait]
impl EscalationNotifier for MetricsNotifier {
    async fn notify(&self, event: &EscalationEvent) -> Result<()> {
        debug!("Counting escalation {} for level {:?}", event.id, event.acuity);
        self.metrics.record_escalation(event.acuity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn stats(waiting_by_level: BTreeMap<AcuityLevel, usize>, escalated_waiting: usize) -> QueueStats {
        QueueStats {
            awaiting_triage: 1,
            waiting: waiting_by_level.values().sum(),
            in_service: 2,
            waiting_by_level,
            escalated_waiting,
            longest_wait_seconds: 0,
            total_escalations: escalated_waiting,
        }
    }

    #[test]
    fn test_render_contains_level_gauges() {
        let metrics = TriageMetrics::new().unwrap();
        let mut by_level = BTreeMap::new();
        by_level.insert(AcuityLevel::Urgent, 3);
        metrics.observe_stats(&stats(by_level, 0));

        let output = metrics.render().unwrap();
        assert!(output.contains("triage_waiting_records{level=\"Urgent\"} 3"));
        assert!(output.contains("triage_waiting_records{level=\"Emergency\"} 0"));
        assert!(output.contains("triage_in_service_records 2"));
    }

    #[test]
    fn test_record_claim() {
        let metrics = TriageMetrics::new().unwrap();
        metrics.record_claim(chrono::Duration::minutes(5));
        metrics.record_claim(chrono::Duration::seconds(-3));
        assert_eq!(metrics.claim_count(), 2);
        assert!(metrics.render().unwrap().contains("triage_wait_at_claim_seconds_count 2"));
    }

    #[test]
    fn test_health_degrades_when_escalated() {
        let metrics = TriageMetrics::new().unwrap();
        let now = Utc::now() - chrono::Duration::days(3);
        let healthy = metrics.health(&stats(BTreeMap::new(), 0), now);
        assert_eq!(healthy.status, HealthLevel::Healthy);
        assert_eq!(healthy.timestamp, now);
        assert_eq!(metrics.health(&stats(BTreeMap::new(), 1), now).status, HealthLevel::Degraded);
    }

    #[tokio::test]
    async fn test_metrics_notifier_counts_by_level() {
        let metrics = Arc::new(TriageMetrics::new().unwrap());
        let notifier = MetricsNotifier::new(metrics.clone());
        let now = Utc::now();
        let event = EscalationEvent {
            id: Uuid::new_v4(),
            intake_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            acuity: AcuityLevel::VeryUrgent,
            arrived_at: now - chrono::Duration::minutes(15),
            sla_deadline: now - chrono::Duration::minutes(5),
            detected_at: now,
            overrun_seconds: 300,
        };

        notifier.notify(&event).await.unwrap();
        assert_eq!(metrics.escalation_count(AcuityLevel::VeryUrgent), 1);
        assert_eq!(metrics.escalation_count(AcuityLevel::Urgent), 0);
    }
}
