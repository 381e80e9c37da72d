//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 急诊分诊等级 (Manchester Triage System)
///
/// 按严重程度从高到低声明，`Ord` 与声明顺序一致：越"小"越紧急。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AcuityLevel {
    Emergency,  // 红色：立即
    VeryUrgent, // 橙色：非常紧急
    Urgent,     // 黄色：紧急
    LessUrgent, // 绿色：次紧急
    NonUrgent,  // 蓝色：非紧急
}

impl AcuityLevel {
    /// 所有等级，最严重在前
    pub const ALL: [AcuityLevel; 5] = [
        AcuityLevel::Emergency,
        AcuityLevel::VeryUrgent,
        AcuityLevel::Urgent,
        AcuityLevel::LessUrgent,
        AcuityLevel::NonUrgent,
    ];

    /// 等级序号，0 为最严重
    pub fn rank(&self) -> usize {
        match self {
            AcuityLevel::Emergency => 0,
            AcuityLevel::VeryUrgent => 1,
            AcuityLevel::Urgent => 2,
            AcuityLevel::LessUrgent => 3,
            AcuityLevel::NonUrgent => 4,
        }
    }

    /// Manchester 色标
    pub fn color(&self) -> &'static str {
        match self {
            AcuityLevel::Emergency => "red",
            AcuityLevel::VeryUrgent => "orange",
            AcuityLevel::Urgent => "yellow",
            AcuityLevel::LessUrgent => "green",
            AcuityLevel::NonUrgent => "blue",
        }
    }

    /// 是否比另一个等级更严重
    pub fn is_more_severe_than(&self, other: &AcuityLevel) -> bool {
        self < other
    }

    /// 取两者中更严重的等级
    pub fn most_severe(self, other: AcuityLevel) -> AcuityLevel {
        self.min(other)
    }
}

impl fmt::Display for AcuityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcuityLevel::Emergency => "Emergency",
            AcuityLevel::VeryUrgent => "VeryUrgent",
            AcuityLevel::Urgent => "Urgent",
            AcuityLevel::LessUrgent => "LessUrgent",
            AcuityLevel::NonUrgent => "NonUrgent",
        };
        write!(f, "{} ({})", name, self.color())
    }
}

/// 生命体征字段
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VitalField {
    SystolicBp,
    DiastolicBp,
    HeartRate,
    RespiratoryRate,
    Temperature,
    OxygenSaturation,
}

impl VitalField {
    pub const ALL: [VitalField; 6] = [
        VitalField::SystolicBp,
        VitalField::DiastolicBp,
        VitalField::HeartRate,
        VitalField::RespiratoryRate,
        VitalField::Temperature,
        VitalField::OxygenSaturation,
    ];

    /// 生理上可信的取值范围（闭区间），超出范围的读数视为录入错误
    pub fn plausible_range(&self) -> (f64, f64) {
        match self {
            VitalField::SystolicBp => (30.0, 300.0),
            VitalField::DiastolicBp => (10.0, 200.0),
            VitalField::HeartRate => (10.0, 300.0),
            VitalField::RespiratoryRate => (1.0, 80.0),
            VitalField::Temperature => (25.0, 45.0),
            VitalField::OxygenSaturation => (30.0, 100.0),
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            VitalField::SystolicBp | VitalField::DiastolicBp => "mmHg",
            VitalField::HeartRate => "bpm",
            VitalField::RespiratoryRate => "/min",
            VitalField::Temperature => "°C",
            VitalField::OxygenSaturation => "%",
        }
    }
}

impl fmt::Display for VitalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VitalField::SystolicBp => "systolic_bp",
            VitalField::DiastolicBp => "diastolic_bp",
            VitalField::HeartRate => "heart_rate",
            VitalField::RespiratoryRate => "respiratory_rate",
            VitalField::Temperature => "temperature",
            VitalField::OxygenSaturation => "oxygen_saturation",
        };
        f.write_str(name)
    }
}

/// 生命体征快照
///
/// 记录后不可修改；重新分诊时生成新的快照。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalSigns {
    pub systolic_bp: Option<f64>,       // 收缩压 mmHg
    pub diastolic_bp: Option<f64>,      // 舒张压 mmHg
    pub heart_rate: Option<f64>,        // 心率 bpm
    pub respiratory_rate: Option<f64>,  // 呼吸频率 次/分
    pub temperature: Option<f64>,       // 体温 °C
    pub oxygen_saturation: Option<f64>, // 血氧饱和度 %
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: Option<Uuid>, // 录入护士ID
}

impl VitalSigns {
    /// 创建空白快照
    pub fn empty(recorded_at: DateTime<Utc>) -> Self {
        Self {
            systolic_bp: None,
            diastolic_bp: None,
            heart_rate: None,
            respiratory_rate: None,
            temperature: None,
            oxygen_saturation: None,
            recorded_at,
            recorded_by: None,
        }
    }

    /// 读取原始值（不做范围校验）
    pub fn raw(&self, field: VitalField) -> Option<f64> {
        match field {
            VitalField::SystolicBp => self.systolic_bp,
            VitalField::DiastolicBp => self.diastolic_bp,
            VitalField::HeartRate => self.heart_rate,
            VitalField::RespiratoryRate => self.respiratory_rate,
            VitalField::Temperature => self.temperature,
            VitalField::OxygenSaturation => self.oxygen_saturation,
        }
    }

    /// 读取可信值；缺失、NaN 或超出生理范围时返回 None
    pub fn reading(&self, field: VitalField) -> Option<f64> {
        let value = self.raw(field)?;
        let (low, high) = field.plausible_range();
        if value.is_finite() && value >= low && value <= high {
            Some(value)
        } else {
            None
        }
    }

    /// 有值但不可信的字段
    pub fn implausible_fields(&self) -> Vec<VitalField> {
        VitalField::ALL
            .into_iter()
            .filter(|field| self.raw(*field).is_some() && self.reading(*field).is_none())
            .collect()
    }

    /// 是否没有任何可信读数
    pub fn is_empty(&self) -> bool {
        VitalField::ALL.iter().all(|field| self.reading(*field).is_none())
    }
}

/// 就诊记录状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntakeStatus {
    AwaitingTriage, // 待分诊
    Triaged,        // 已分诊候诊
    InService,      // 接诊中
    Completed,      // 已完成
    Cancelled,      // 已取消
}

impl IntakeStatus {
    /// 终止状态不允许任何转换
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntakeStatus::Completed | IntakeStatus::Cancelled)
    }
}

impl fmt::Display for IntakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 就诊记录状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntakeEvent {
    Triage,   // 分诊 / 重新分诊
    Claim,    // 医生接诊
    Complete, // 完成
    Cancel,   // 取消
}

impl fmt::Display for IntakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 分诊结论来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssessmentSource {
    Keywords,          // 主诉关键词
    VitalSigns,        // 生命体征下限规则
    Default,           // 无规则命中
    ClinicianOverride, // 人工指定
}

/// 一次分诊评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageAssessment {
    pub level: AcuityLevel,
    pub source: AssessmentSource,
    pub matched_rules: Vec<String>,
    pub vital_signs: Option<VitalSigns>,
    pub assessed_at: DateTime<Utc>,
    pub assessed_by: Option<Uuid>,
}

/// 急诊就诊记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub id: Uuid,
    pub patient_id: Uuid, // 患者登记系统中的患者ID
    pub arrived_at: DateTime<Utc>,
    pub chief_complaint: String,
    pub acuity: Option<AcuityLevel>,
    pub vital_signs: Option<VitalSigns>,
    pub status: IntakeStatus,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub escalated_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub assessments: Vec<TriageAssessment>,
}

impl IntakeRecord {
    /// 患者到达时创建记录，状态为待分诊
    pub fn new(patient_id: Uuid, chief_complaint: impl Into<String>, arrived_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            arrived_at,
            chief_complaint: chief_complaint.into(),
            acuity: None,
            vital_signs: None,
            status: IntakeStatus::AwaitingTriage,
            sla_deadline: None,
            escalated_at: None,
            claimed_by: None,
            claimed_at: None,
            closed_at: None,
            cancel_reason: None,
            assessments: Vec::new(),
        }
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated_at.is_some()
    }

    /// 截至 now 的等待时长
    pub fn waited(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.arrived_at)
    }
}

/// SLA 超时升级事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: Uuid,
    pub intake_id: Uuid,
    pub patient_id: Uuid,
    pub acuity: AcuityLevel,
    pub arrived_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub overrun_seconds: i64,
}

impl EscalationEvent {
    /// 超出SLA的时长
    pub fn overrun(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.overrun_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acuity_order_is_severity_order() {
        assert!(AcuityLevel::Emergency < AcuityLevel::VeryUrgent);
        assert!(AcuityLevel::LessUrgent < AcuityLevel::NonUrgent);
        assert!(AcuityLevel::Urgent.is_more_severe_than(&AcuityLevel::LessUrgent));
        assert_eq!(
            AcuityLevel::Urgent.most_severe(AcuityLevel::VeryUrgent),
            AcuityLevel::VeryUrgent
        );

        for (index, level) in AcuityLevel::ALL.iter().enumerate() {
            assert_eq!(level.rank(), index);
        }
    }

    #[test]
    fn test_implausible_vitals_are_ignored() {
        let mut vitals = VitalSigns::empty(Utc::now());
        vitals.oxygen_saturation = Some(140.0);
        vitals.heart_rate = Some(f64::NAN);
        vitals.temperature = Some(37.2);

        assert_eq!(vitals.reading(VitalField::OxygenSaturation), None);
        assert_eq!(vitals.reading(VitalField::HeartRate), None);
        assert_eq!(vitals.reading(VitalField::Temperature), Some(37.2));
        assert_eq!(
            vitals.implausible_fields(),
            vec![VitalField::HeartRate, VitalField::OxygenSaturation]
        );
        assert!(!vitals.is_empty());
    }

    #[test]
    fn test_new_record_awaits_triage() {
        let record = IntakeRecord::new(Uuid::new_v4(), "headache", Utc::now());
        assert_eq!(record.status, IntakeStatus::AwaitingTriage);
        assert!(record.acuity.is_none());
        assert!(record.sla_deadline.is_none());
        assert!(!record.is_escalated());
        assert!(IntakeStatus::Cancelled.is_terminal());
        assert!(!IntakeStatus::InService.is_terminal());
    }
}
