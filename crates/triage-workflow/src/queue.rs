//! 候诊优先级队列
//!
//! 每个分诊等级维护一条有序队列，出队时从最严重的等级开始扫描，
//! 取第一条非空队列的队首。等级内按 (到达时间, 记录ID) 排序。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use triage_core::{AcuityLevel, IntakeRecord, IntakeStatus, Result, TriageError};
use uuid::Uuid;

/// 队列条目
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub intake_id: Uuid,
    pub arrived_at: DateTime<Utc>,
}

impl QueueEntry {
    fn key(&self) -> (DateTime<Utc>, Uuid) {
        (self.arrived_at, self.intake_id)
    }
}

/// 候诊队列
#[derive(Debug, Default)]
pub struct TriageQueue {
    lanes: [VecDeque<QueueEntry>; 5],
    index: HashMap<Uuid, AcuityLevel>, // intake_id -> 所在等级
}

impl TriageQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 将已分诊记录加入候诊队列
    pub fn enqueue(&mut self, record: &IntakeRecord) -> Result<()> {
        let level = match (record.status, record.acuity) {
            (IntakeStatus::Triaged, Some(level)) => level,
            _ => return Err(TriageError::NotTriaged(record.id)),
        };

        if self.index.contains_key(&record.id) {
            return Err(TriageError::AlreadyQueued(record.id));
        }

        let entry = QueueEntry {
            intake_id: record.id,
            arrived_at: record.arrived_at,
        };
        insert_ordered(&mut self.lanes[level.rank()], entry);
        self.index.insert(record.id, level);

        tracing::debug!("Queued intake {} at level {:?}", record.id, level);
        Ok(())
    }

    /// 查看下一位候诊者（不出队）
    pub fn peek_next(&self) -> Option<(AcuityLevel, QueueEntry)> {
        AcuityLevel::ALL
            .iter()
            .find_map(|level| self.lanes[level.rank()].front().map(|entry| (*level, *entry)))
    }

    /// 取出下一位候诊者
    pub fn pop_next(&mut self) -> Option<(AcuityLevel, QueueEntry)> {
        let level = AcuityLevel::ALL
            .into_iter()
            .find(|level| !self.lanes[level.rank()].is_empty())?;
        let entry = self.lanes[level.rank()].pop_front()?;
        self.index.remove(&entry.intake_id);
        Some((level, entry))
    }

    /// 从队列中移除指定记录
    pub fn remove(&mut self, intake_id: Uuid) -> Option<(AcuityLevel, QueueEntry)> {
        let level = self.index.remove(&intake_id)?;
        let lane = &mut self.lanes[level.rank()];
        let position = lane.iter().position(|entry| entry.intake_id == intake_id)?;
        lane.remove(position).map(|entry| (level, entry))
    }

    /// 重新分诊后将记录移到新等级，其他记录的相对顺序不变
    pub fn move_to(&mut self, intake_id: Uuid, new_level: AcuityLevel) -> Result<()> {
        let current = self
            .level_of(intake_id)
            .ok_or_else(|| TriageError::intake_not_found(intake_id))?;
        if current == new_level {
            return Ok(());
        }

        let (_, entry) = self
            .remove(intake_id)
            .ok_or_else(|| TriageError::Internal(format!("Queue index out of sync for {}", intake_id)))?;
        insert_ordered(&mut self.lanes[new_level.rank()], entry);
        self.index.insert(intake_id, new_level);

        tracing::debug!("Moved intake {} from {:?} to {:?}", intake_id, current, new_level);
        Ok(())
    }

    pub fn level_of(&self, intake_id: Uuid) -> Option<AcuityLevel> {
        self.index.get(&intake_id).copied()
    }

    pub fn contains(&self, intake_id: Uuid) -> bool {
        self.index.contains_key(&intake_id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// 某等级的候诊人数
    pub fn len_at(&self, level: AcuityLevel) -> usize {
        self.lanes[level.rank()].len()
    }

    /// 按出队顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (AcuityLevel, &QueueEntry)> + '_ {
        AcuityLevel::ALL
            .into_iter()
            .flat_map(move |level| self.lanes[level.rank()].iter().map(move |entry| (level, entry)))
    }
}

/// 按 (到达时间, ID) 有序插入；正常情况下直接追加到队尾
fn insert_ordered(lane: &mut VecDeque<QueueEntry>, entry: QueueEntry) {
    match lane.back() {
        Some(last) if last.key() > entry.key() => {
            let position = lane.partition_point(|existing| existing.key() < entry.key());
            lane.insert(position, entry);
        }
        _ => lane.push_back(entry),
    }
}
