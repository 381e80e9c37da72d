//! 分诊服务
//!
//! 候诊队列唯一的同步边界：所有修改操作在同一把写锁下串行执行，
//! 查询操作持读锁，看到的始终是一致的快照。

use crate::clock::{Clock, SystemClock};
use crate::engine::{QueueStats, TriageEngine, TriageRequest};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use triage_core::{EscalationEvent, IntakeRecord, Result, TriageError};
use uuid::Uuid;

/// 可在多个任务间共享的分诊服务
#[derive(Debug, Clone)]
pub struct TriageService {
    engine: Arc<RwLock<TriageEngine>>,
    clock: Arc<dyn Clock>,
}

impl TriageService {
    /// 使用系统时钟创建服务
    pub fn new(engine: TriageEngine) -> Self {
        Self::with_clock(engine, Arc::new(SystemClock))
    }

    pub fn with_clock(engine: TriageEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 登记患者到达
    pub async fn register_arrival(&self, patient_id: Uuid, chief_complaint: &str) -> IntakeRecord {
        let now = self.clock.now();
        self.engine.write().await.register_arrival(patient_id, chief_complaint, now)
    }

    /// 分诊 / 重新分诊
    pub async fn triage(&self, intake_id: Uuid, request: TriageRequest) -> Result<IntakeRecord> {
        let now = self.clock.now();
        self.engine.write().await.triage(intake_id, request, now)
    }

    /// 查看下一位候诊者
    pub async fn peek_next(&self) -> Option<IntakeRecord> {
        self.engine.read().await.peek_next()
    }

    /// 接诊下一位候诊者；队列为空时立即返回 None
    pub async fn claim(&self, clinician_id: Uuid) -> Result<Option<IntakeRecord>> {
        let now = self.clock.now();
        self.engine.write().await.claim(clinician_id, now)
    }

    pub async fn cancel(&self, intake_id: Uuid, reason: Option<String>) -> Result<IntakeRecord> {
        let now = self.clock.now();
        self.engine.write().await.cancel(intake_id, reason, now)
    }

    pub async fn complete(&self, intake_id: Uuid) -> Result<IntakeRecord> {
        let now = self.clock.now();
        self.engine.write().await.complete(intake_id, now)
    }

    /// 以当前时间执行一次SLA超时检查
    pub async fn sweep(&self) -> Vec<EscalationEvent> {
        let now = self.clock.now();
        self.sweep_at(now).await
    }

    /// 以指定时间执行一次SLA超时检查
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Vec<EscalationEvent> {
        self.engine.write().await.sweep(now)
    }

    pub async fn get(&self, intake_id: Uuid) -> Result<IntakeRecord> {
        self.engine
            .read()
            .await
            .get(intake_id)
            .cloned()
            .ok_or_else(|| TriageError::intake_not_found(intake_id))
    }

    pub async fn waiting(&self) -> Vec<IntakeRecord> {
        self.engine.read().await.waiting()
    }

    pub async fn awaiting_triage(&self) -> Vec<IntakeRecord> {
        self.engine.read().await.awaiting_triage()
    }

    pub async fn escalations(&self, limit: Option<usize>) -> Vec<EscalationEvent> {
        self.engine.read().await.escalations(limit)
    }

    pub async fn stats(&self) -> QueueStats {
        let now = self.clock.now();
        self.engine.read().await.stats(now)
    }

    /// 清理结束超过 retention 的记录；截止时间超出可表示范围时不清理
    pub async fn prune_closed(&self, retention: chrono::Duration) -> usize {
        let now = self.clock.now();
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            tracing::warn!("Closed record retention {} is out of range, skipping prune", retention);
            return 0;
        };
        self.engine.write().await.prune_closed(cutoff)
    }
}
