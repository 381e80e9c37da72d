//! 分诊等级的最长候诊时间 (SLA) 策略

use crate::error::{Result, TriageError};
use crate::models::AcuityLevel;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 各分诊等级的最长候诊时间（分钟）
///
/// 天花板必须随严重程度降低而严格递增。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaPolicy {
    pub emergency_minutes: u32,
    pub very_urgent_minutes: u32,
    pub urgent_minutes: u32,
    pub less_urgent_minutes: u32,
    pub non_urgent_minutes: u32,
}

impl SlaPolicy {
    /// 创建并校验策略
    pub fn new(
        emergency_minutes: u32,
        very_urgent_minutes: u32,
        urgent_minutes: u32,
        less_urgent_minutes: u32,
        non_urgent_minutes: u32,
    ) -> Result<Self> {
        let policy = Self {
            emergency_minutes,
            very_urgent_minutes,
            urgent_minutes,
            less_urgent_minutes,
            non_urgent_minutes,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// 某等级的天花板（分钟）
    pub fn ceiling_minutes(&self, level: AcuityLevel) -> u32 {
        match level {
            AcuityLevel::Emergency => self.emergency_minutes,
            AcuityLevel::VeryUrgent => self.very_urgent_minutes,
            AcuityLevel::Urgent => self.urgent_minutes,
            AcuityLevel::LessUrgent => self.less_urgent_minutes,
            AcuityLevel::NonUrgent => self.non_urgent_minutes,
        }
    }

    pub fn ceiling(&self, level: AcuityLevel) -> Duration {
        Duration::minutes(i64::from(self.ceiling_minutes(level)))
    }

    /// SLA截止时间，始终以到达时间为锚点
    pub fn deadline(&self, arrived_at: DateTime<Utc>, level: AcuityLevel) -> DateTime<Utc> {
        arrived_at + self.ceiling(level)
    }

    /// 若 now 时已超出天花板，返回超出时长
    pub fn overrun(&self, arrived_at: DateTime<Utc>, level: AcuityLevel, now: DateTime<Utc>) -> Option<Duration> {
        let elapsed = now.signed_duration_since(arrived_at);
        let ceiling = self.ceiling(level);
        if elapsed > ceiling {
            Some(elapsed - ceiling)
        } else {
            None
        }
    }

    /// 校验天花板严格递增
    pub fn validate(&self) -> Result<()> {
        for pair in AcuityLevel::ALL.windows(2) {
            let (tighter, looser) = (pair[0], pair[1]);
            if self.ceiling_minutes(tighter) >= self.ceiling_minutes(looser) {
                return Err(TriageError::Config(format!(
                    "SLA ceiling for {} ({} min) must be below {} ({} min)",
                    tighter,
                    self.ceiling_minutes(tighter),
                    looser,
                    self.ceiling_minutes(looser)
                )));
            }
        }
        Ok(())
    }
}

impl Default for SlaPolicy {
    fn default() -> Self {
        Self {
            emergency_minutes: 0,
            very_urgent_minutes: 10,
            urgent_minutes: 60,
            less_urgent_minutes: 120,
            non_urgent_minutes: 240,
        }
    }
}
