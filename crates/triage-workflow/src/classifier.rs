//! 分诊等级判定
//!
//! 根据主诉文本和生命体征给出 Manchester 分诊等级。规则全部来自配置：
//! 关键词规则决定文本等级，生命体征规则只能把等级向更严重方向抬高。

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use triage_core::{
    AcuityLevel, AssessmentSource, Result, TriageAssessment, TriageError, VitalField, VitalSigns,
};
use uuid::Uuid;

/// 阈值比较方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Below,
    AtOrBelow,
    Above,
    AtOrAbove,
}

impl Comparison {
    fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Below => value < threshold,
            Comparison::AtOrBelow => value <= threshold,
            Comparison::Above => value > threshold,
            Comparison::AtOrAbove => value >= threshold,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Below => "<",
            Comparison::AtOrBelow => "<=",
            Comparison::Above => ">",
            Comparison::AtOrAbove => ">=",
        }
    }
}

/// 生命体征规则：读数满足比较条件时，等级至少为 minimum_level
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VitalRule {
    pub vital: VitalField,
    pub comparison: Comparison,
    pub threshold: f64,
    pub minimum_level: AcuityLevel,
}

impl VitalRule {
    pub fn new(vital: VitalField, comparison: Comparison, threshold: f64, minimum_level: AcuityLevel) -> Self {
        Self {
            vital,
            comparison,
            threshold,
            minimum_level,
        }
    }

    fn describe(&self, value: f64) -> String {
        format!(
            "vital:{} {} {} ({} {}) -> {:?}",
            self.vital,
            self.comparison.symbol(),
            self.threshold,
            value,
            self.vital.unit(),
            self.minimum_level
        )
    }
}

/// 主诉关键词规则
///
/// 纯文本短语按整词、忽略大小写匹配；含正则元字符时按正则处理。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordRule {
    pub pattern: String,
    pub level: AcuityLevel,
}

impl KeywordRule {
    pub fn new(pattern: impl Into<String>, level: AcuityLevel) -> Self {
        Self {
            pattern: pattern.into(),
            level,
        }
    }
}

/// 分诊规则配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// 有主诉但没有任何规则命中时使用的等级
    pub default_level: AcuityLevel,
    pub vital_rules: Vec<VitalRule>,
    pub keyword_rules: Vec<KeywordRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        use AcuityLevel::*;
        use Comparison::*;
        use VitalField::*;

        let vital_rules = vec![
            VitalRule::new(OxygenSaturation, Below, 85.0, Emergency),
            VitalRule::new(OxygenSaturation, Below, 92.0, VeryUrgent),
            VitalRule::new(HeartRate, Above, 150.0, VeryUrgent),
            VitalRule::new(HeartRate, Below, 40.0, VeryUrgent),
            VitalRule::new(HeartRate, Above, 120.0, Urgent),
            VitalRule::new(RespiratoryRate, Above, 30.0, VeryUrgent),
            VitalRule::new(RespiratoryRate, Below, 8.0, VeryUrgent),
            VitalRule::new(RespiratoryRate, Above, 24.0, Urgent),
            VitalRule::new(Temperature, AtOrAbove, 41.0, VeryUrgent),
            VitalRule::new(Temperature, AtOrAbove, 38.5, Urgent),
            VitalRule::new(Temperature, Below, 35.0, Urgent),
            VitalRule::new(SystolicBp, Below, 90.0, VeryUrgent),
            VitalRule::new(SystolicBp, AtOrAbove, 220.0, VeryUrgent),
            VitalRule::new(SystolicBp, AtOrAbove, 180.0, Urgent),
        ];

        let keyword_rules = [
            ("cardiac arrest", Emergency),
            ("not breathing", Emergency),
            ("unresponsive", Emergency),
            ("seizure", Emergency),
            ("chest pain", VeryUrgent),
            ("stroke", VeryUrgent),
            ("severe bleeding", VeryUrgent),
            ("anaphylaxis", VeryUrgent),
            ("overdose", VeryUrgent),
            ("fracture", Urgent),
            ("abdominal pain", Urgent),
            ("head injury", Urgent),
            ("high fever", Urgent),
            ("laceration", LessUrgent),
            ("sprain", LessUrgent),
            ("vomiting", LessUrgent),
            ("earache", LessUrgent),
        ]
        .into_iter()
        .map(|(pattern, level)| KeywordRule::new(pattern, level))
        .collect();

        Self {
            vital_rules,
            keyword_rules,
            default_level: NonUrgent,
        }
    }
}

#[derive(Debug)]
struct CompiledKeyword {
    pattern: String,
    regex: Regex,
    level: AcuityLevel,
}

/// 分诊等级判定器
///
/// 无状态、确定性；判定本身从不失败。
#[derive(Debug)]
pub struct AcuityClassifier {
    vital_rules: Vec<VitalRule>,
    keyword_rules: Vec<CompiledKeyword>,
    default_level: AcuityLevel,
}

impl AcuityClassifier {
    /// 编译规则；非法的正则表达式属于配置错误
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let keyword_rules = config
            .keyword_rules
            .iter()
            .map(|rule| {
                let regex = compile_keyword(&rule.pattern)?;
                Ok(CompiledKeyword {
                    pattern: rule.pattern.clone(),
                    regex,
                    level: rule.level,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for rule in &config.vital_rules {
            if !rule.threshold.is_finite() {
                return Err(TriageError::Config(format!(
                    "Vital rule threshold for {} must be finite",
                    rule.vital
                )));
            }
        }

        tracing::debug!(
            "Classifier compiled with {} keyword rules and {} vital rules",
            keyword_rules.len(),
            config.vital_rules.len()
        );

        Ok(Self {
            vital_rules: config.vital_rules,
            keyword_rules,
            default_level: config.default_level,
        })
    }

    /// 给出分诊等级
    pub fn classify(&self, complaint: &str, vitals: Option<&VitalSigns>) -> AcuityLevel {
        self.assess(complaint, vitals, Utc::now(), None).level
    }

    /// 给出带命中规则明细的完整评估
    pub fn assess(
        &self,
        complaint: &str,
        vitals: Option<&VitalSigns>,
        assessed_at: DateTime<Utc>,
        assessed_by: Option<Uuid>,
    ) -> TriageAssessment {
        let mut matched_rules = Vec::new();

        // 1. 主诉关键词
        let keyword_level = self
            .keyword_rules
            .iter()
            .filter(|rule| rule.regex.is_match(complaint))
            .map(|rule| {
                matched_rules.push(format!("keyword:{} -> {:?}", rule.pattern, rule.level));
                rule.level
            })
            .min();

        // 2. 生命体征下限
        let vital_floor = vitals.and_then(|vitals| {
            let implausible = vitals.implausible_fields();
            if !implausible.is_empty() {
                tracing::warn!("Ignoring implausible vital readings: {:?}", implausible);
            }

            self.vital_rules
                .iter()
                .filter_map(|rule| {
                    let value = vitals.reading(rule.vital)?;
                    rule.comparison.holds(value, rule.threshold).then(|| {
                        matched_rules.push(rule.describe(value));
                        rule.minimum_level
                    })
                })
                .min()
        });

        // 3. 文本等级：关键词优先，其次默认等级；完全没有输入时为最低等级
        let no_input = complaint.trim().is_empty() && vitals.map_or(true, VitalSigns::is_empty);
        let text_level = match keyword_level {
            Some(level) => level,
            None if no_input => AcuityLevel::NonUrgent,
            None => self.default_level,
        };

        let (level, source) = match vital_floor {
            Some(floor) if floor < text_level => (floor, AssessmentSource::VitalSigns),
            _ if keyword_level.is_some() => (text_level, AssessmentSource::Keywords),
            _ => (text_level, AssessmentSource::Default),
        };

        TriageAssessment {
            level,
            source,
            matched_rules,
            vital_signs: vitals.cloned(),
            assessed_at,
            assessed_by,
        }
    }

    /// 人工指定等级的评估
    pub fn clinician_override(
        level: AcuityLevel,
        vitals: Option<&VitalSigns>,
        assessed_at: DateTime<Utc>,
        assessed_by: Option<Uuid>,
    ) -> TriageAssessment {
        TriageAssessment {
            level,
            source: AssessmentSource::ClinicianOverride,
            matched_rules: vec![format!("override -> {:?}", level)],
            vital_signs: vitals.cloned(),
            assessed_at,
            assessed_by,
        }
    }

    pub fn keyword_rule_count(&self) -> usize {
        self.keyword_rules.len()
    }

    pub fn vital_rule_count(&self) -> usize {
        self.vital_rules.len()
    }
}

/// 编译关键词规则
fn compile_keyword(pattern: &str) -> Result<Regex> {
    let plain = pattern
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '\'');

    let source = if plain {
        format!(r"\b{}\b", regex::escape(pattern.trim()))
    } else {
        pattern.to_string()
    };

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .map_err(|e| TriageError::Config(format!("Invalid keyword pattern '{}': {}", pattern, e)))
}
