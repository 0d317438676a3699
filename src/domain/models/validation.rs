// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 校验结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

/// 数据质量等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQuality::Excellent => write!(f, "excellent"),
            DataQuality::Good => write!(f, "good"),
            DataQuality::Acceptable => write!(f, "acceptable"),
            DataQuality::Poor => write!(f, "poor"),
        }
    }
}

/// 问题类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    UnexpectedField,
    TypeMismatch,
    OutOfRange,
    InvalidValue,
    BusinessRule,
    Malformed,
    /// 没有注册对应的规则集
    UnknownRecordType,
    StaleTimestamp,
}

/// 单条校验问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: Option<String>,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: Option<&str>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            field: field.map(str::to_string),
            kind,
            message: message.into(),
        }
    }

    pub fn field(field: &str, kind: IssueKind, message: impl Into<String>) -> Self {
        Self::new(Some(field), kind, message)
    }
}

/// 异常严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

/// 统计意义上可疑但结构合法的数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// 异常类别，例如 temperature、wind、travel
    pub kind: String,
    pub field: String,
    pub severity: AnomalySeverity,
    pub message: String,
    pub observed: f64,
    pub expected_min: f64,
    pub expected_max: f64,
}

impl Anomaly {
    /// 根据偏离区间的幅度推断严重程度
    pub fn outside_band(kind: &str, field: &str, observed: f64, min: f64, max: f64) -> Self {
        let span = (max - min).abs().max(1.0);
        let deviation = if observed < min {
            min - observed
        } else {
            observed - max
        };
        let severity = if deviation > span * 0.5 {
            AnomalySeverity::High
        } else if deviation > span * 0.2 {
            AnomalySeverity::Medium
        } else {
            AnomalySeverity::Low
        };
        Self {
            kind: kind.to_string(),
            field: field.to_string(),
            severity,
            message: format!(
                "{} value {} outside expected range [{}, {}]",
                field, observed, min, max
            ),
            observed,
            expected_min: min,
            expected_max: max,
        }
    }
}

/// 一条记录的校验结果
///
/// 对相同输入和相同时钟，结果（包括 id）完全一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: Uuid,
    pub domain: String,
    pub record_type: String,
    pub source_id: String,
    pub status: ValidationStatus,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub anomalies: Vec<Anomaly>,
    /// 非空字段占比
    pub completeness: f64,
    /// 新鲜度系数
    pub freshness: f64,
    /// 置信度，范围 [0.1, 1.0]
    pub confidence: f64,
    pub quality: DataQuality,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}
