//! 分诊引擎
//!
//! 协调分诊判定、状态机、候诊队列和SLA超时检查的核心引擎。
//! 引擎本身不加锁，由 [`crate::service::TriageService`] 保证单写者访问。

use crate::classifier::AcuityClassifier;
use crate::queue::TriageQueue;
use crate::state_machine::IntakeStateMachine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use triage_core::utils::{format_wait, normalize_complaint};
use triage_core::{
    AcuityLevel, EscalationEvent, IntakeEvent, IntakeRecord, IntakeStatus, Result, SlaPolicy,
    TriageError, VitalSigns,
};
use uuid::Uuid;

/// 默认保留的升级事件条数
pub const DEFAULT_ESCALATION_HISTORY: usize = 1000;

/// 分诊 / 重新分诊请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriageRequest {
    /// 新的生命体征快照；为空时沿用上一次的快照
    pub vital_signs: Option<VitalSigns>,
    /// 更新后的主诉；为空时沿用原主诉
    pub chief_complaint: Option<String>,
    /// 人工指定等级，优先于规则判定
    pub override_level: Option<AcuityLevel>,
    pub assessed_by: Option<Uuid>,
}

/// 候诊队列统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub awaiting_triage: usize,
    pub waiting: usize,
    pub in_service: usize,
    pub waiting_by_level: BTreeMap<AcuityLevel, usize>,
    pub escalated_waiting: usize,
    pub longest_wait_seconds: i64,
    pub total_escalations: usize,
}

/// 分诊引擎
#[derive(Debug)]
pub struct TriageEngine {
    classifier: AcuityClassifier,
    sla_policy: SlaPolicy,
    state_machine: IntakeStateMachine,
    queue: TriageQueue,
    records: HashMap<Uuid, IntakeRecord>,
    escalation_history: VecDeque<EscalationEvent>,
    history_limit: usize,
    total_escalations: usize,
    last_sweep_at: Option<DateTime<Utc>>,
}

impl TriageEngine {
    /// 创建新的分诊引擎
    pub fn new(classifier: AcuityClassifier, sla_policy: SlaPolicy) -> Self {
        Self {
            classifier,
            sla_policy,
            state_machine: IntakeStateMachine::new(),
            queue: TriageQueue::new(),
            records: HashMap::new(),
            escalation_history: VecDeque::new(),
            history_limit: DEFAULT_ESCALATION_HISTORY,
            total_escalations: 0,
            last_sweep_at: None,
        }
    }

    /// 设置升级事件保留条数，至少保留 1 条
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// 登记患者到达，创建待分诊记录
    pub fn register_arrival(
        &mut self,
        patient_id: Uuid,
        chief_complaint: &str,
        arrived_at: DateTime<Utc>,
    ) -> IntakeRecord {
        let record = IntakeRecord::new(patient_id, normalize_complaint(chief_complaint), arrived_at);
        self.records.insert(record.id, record.clone());

        tracing::info!("Registered intake {} for patient {}", record.id, patient_id);
        record
    }

    /// 分诊或重新分诊
    ///
    /// SLA截止时间始终以原始到达时间为锚点重新计算。
    pub fn triage(&mut self, intake_id: Uuid, request: TriageRequest, assessed_at: DateTime<Utc>) -> Result<IntakeRecord> {
        let record = self.active_record(intake_id)?;
        let previous_status = record.status;
        let previous_level = record.acuity;
        let new_status = self.state_machine.transition(previous_status, IntakeEvent::Triage)?;

        let mut updated = record.clone();
        if let Some(complaint) = &request.chief_complaint {
            updated.chief_complaint = normalize_complaint(complaint);
        }
        if let Some(vitals) = request.vital_signs {
            updated.vital_signs = Some(vitals);
        }

        let assessment = match request.override_level {
            Some(level) => AcuityClassifier::clinician_override(
                level,
                updated.vital_signs.as_ref(),
                assessed_at,
                request.assessed_by,
            ),
            None => self.classifier.assess(
                &updated.chief_complaint,
                updated.vital_signs.as_ref(),
                assessed_at,
                request.assessed_by,
            ),
        };
        let level = assessment.level;

        updated.status = new_status;
        updated.acuity = Some(level);
        updated.sla_deadline = Some(self.sla_policy.deadline(updated.arrived_at, level));
        // 等级变化后按新的天花板重新判断是否超时
        if previous_level.is_some() && previous_level != Some(level) {
            updated.escalated_at = None;
        }
        updated.assessments.push(assessment);

        match previous_status {
            IntakeStatus::AwaitingTriage => self.queue.enqueue(&updated)?,
            _ => self.queue.move_to(intake_id, level)?,
        }
        self.records.insert(intake_id, updated.clone());

        match previous_level {
            Some(previous) if previous != level => tracing::info!(
                "Intake {} re-triaged from {:?} to {:?}",
                intake_id,
                previous,
                level
            ),
            Some(_) => tracing::info!("Intake {} re-triaged, level unchanged ({:?})", intake_id, level),
            None => tracing::info!("Intake {} triaged as {}", intake_id, level),
        }

        Ok(updated)
    }

    /// 查看下一位应接诊的记录
    pub fn peek_next(&self) -> Option<IntakeRecord> {
        let (_, entry) = self.queue.peek_next()?;
        self.records.get(&entry.intake_id).cloned()
    }

    /// 医生接诊：取出队首记录并转为接诊中
    pub fn claim(&mut self, clinician_id: Uuid, claimed_at: DateTime<Utc>) -> Result<Option<IntakeRecord>> {
        let Some((_, entry)) = self.queue.peek_next() else {
            return Ok(None);
        };

        let record = self
            .records
            .get_mut(&entry.intake_id)
            .ok_or_else(|| TriageError::Internal(format!("Queued intake {} has no record", entry.intake_id)))?;
        let new_status = self.state_machine.transition(record.status, IntakeEvent::Claim)?;

        self.queue.pop_next();
        record.status = new_status;
        record.claimed_by = Some(clinician_id);
        record.claimed_at = Some(claimed_at);

        tracing::info!(
            "Intake {} ({:?}) claimed by {} after waiting {}",
            record.id,
            record.acuity,
            clinician_id,
            format_wait(record.waited(claimed_at))
        );
        Ok(Some(record.clone()))
    }

    /// 取消待分诊或候诊中的记录
    pub fn cancel(&mut self, intake_id: Uuid, reason: Option<String>, cancelled_at: DateTime<Utc>) -> Result<IntakeRecord> {
        let record = self.active_record(intake_id)?;
        let new_status = self.state_machine.transition(record.status, IntakeEvent::Cancel)?;

        self.queue.remove(intake_id);
        let record = self
            .records
            .get_mut(&intake_id)
            .ok_or_else(|| TriageError::intake_not_found(intake_id))?;
        record.status = new_status;
        record.closed_at = Some(cancelled_at);
        record.cancel_reason = reason;

        tracing::info!("Intake {} cancelled", intake_id);
        Ok(record.clone())
    }

    /// 完成接诊
    pub fn complete(&mut self, intake_id: Uuid, completed_at: DateTime<Utc>) -> Result<IntakeRecord> {
        let record = self.active_record(intake_id)?;
        let new_status = self.state_machine.transition(record.status, IntakeEvent::Complete)?;

        let record = self
            .records
            .get_mut(&intake_id)
            .ok_or_else(|| TriageError::intake_not_found(intake_id))?;
        record.status = new_status;
        record.closed_at = Some(completed_at);

        tracing::info!("Intake {} completed", intake_id);
        Ok(record.clone())
    }

    /// SLA超时检查
    ///
    /// 对每条候诊记录只产生一次升级事件；不会修改分诊等级。
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<EscalationEvent> {
        if let Some(last) = self.last_sweep_at {
            if now < last {
                tracing::warn!("Escalation sweep clock went backwards: {} < {}", now, last);
            }
        }
        self.last_sweep_at = Some(now);

        let mut events = Vec::new();
        for (level, entry) in self.queue.iter() {
            let Some(record) = self.records.get_mut(&entry.intake_id) else {
                continue;
            };
            if record.escalated_at.is_some() {
                continue;
            }
            let Some(overrun) = self.sla_policy.overrun(record.arrived_at, level, now) else {
                continue;
            };

            record.escalated_at = Some(now);
            let event = EscalationEvent {
                id: Uuid::new_v4(),
                intake_id: record.id,
                patient_id: record.patient_id,
                acuity: level,
                arrived_at: record.arrived_at,
                sla_deadline: self.sla_policy.deadline(record.arrived_at, level),
                detected_at: now,
                overrun_seconds: overrun.num_seconds(),
            };

            tracing::warn!(
                "Intake {} exceeded {:?} wait ceiling by {}",
                record.id,
                level,
                format_wait(overrun)
            );
            events.push(event);
        }

        for event in &events {
            if self.escalation_history.len() >= self.history_limit {
                self.escalation_history.pop_front();
            }
            self.escalation_history.push_back(event.clone());
        }
        self.total_escalations += events.len();

        events
    }

    /// 获取就诊记录
    pub fn get(&self, intake_id: Uuid) -> Option<&IntakeRecord> {
        self.records.get(&intake_id)
    }

    /// 按接诊顺序列出候诊记录
    pub fn waiting(&self) -> Vec<IntakeRecord> {
        self.queue
            .iter()
            .filter_map(|(_, entry)| self.records.get(&entry.intake_id).cloned())
            .collect()
    }

    /// 列出待分诊记录（按到达时间）
    pub fn awaiting_triage(&self) -> Vec<IntakeRecord> {
        let mut records: Vec<IntakeRecord> = self
            .records
            .values()
            .filter(|record| record.status == IntakeStatus::AwaitingTriage)
            .cloned()
            .collect();
        records.sort_by_key(|record| (record.arrived_at, record.id));
        records
    }

    /// 最近的升级事件，最新的在前
    pub fn escalations(&self, limit: Option<usize>) -> Vec<EscalationEvent> {
        self.escalation_history
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// 队列统计
    pub fn stats(&self, now: DateTime<Utc>) -> QueueStats {
        let mut stats = QueueStats {
            awaiting_triage: 0,
            waiting: self.queue.len(),
            in_service: 0,
            waiting_by_level: AcuityLevel::ALL
                .into_iter()
                .map(|level| (level, self.queue.len_at(level)))
                .collect(),
            escalated_waiting: 0,
            longest_wait_seconds: 0,
            total_escalations: self.total_escalations,
        };

        for record in self.records.values() {
            match record.status {
                IntakeStatus::AwaitingTriage => stats.awaiting_triage += 1,
                IntakeStatus::InService => stats.in_service += 1,
                IntakeStatus::Triaged => {
                    if record.is_escalated() {
                        stats.escalated_waiting += 1;
                    }
                }
                IntakeStatus::Completed | IntakeStatus::Cancelled => continue,
            }

            if matches!(record.status, IntakeStatus::AwaitingTriage | IntakeStatus::Triaged) {
                stats.longest_wait_seconds = stats.longest_wait_seconds.max(record.waited(now).num_seconds());
            }
        }

        stats
    }

    /// 清理在 before 之前结束的记录
    pub fn prune_closed(&mut self, before: DateTime<Utc>) -> usize {
        let initial = self.records.len();
        self.records.retain(|_, record| {
            !(record.status.is_terminal() && record.closed_at.map_or(false, |closed| closed < before))
        });
        let pruned = initial - self.records.len();

        if pruned > 0 {
            tracing::info!("Pruned {} closed intake records", pruned);
        }
        pruned
    }

    pub fn sla_policy(&self) -> &SlaPolicy {
        &self.sla_policy
    }

    pub fn classifier(&self) -> &AcuityClassifier {
        &self.classifier
    }

    /// 获取未终止的记录；未知或已终止都视为未找到
    fn active_record(&self, intake_id: Uuid) -> Result<&IntakeRecord> {
        match self.records.get(&intake_id) {
            Some(record) if !record.status.is_terminal() => Ok(record),
            _ => Err(TriageError::intake_not_found(intake_id)),
        }
    }
}
