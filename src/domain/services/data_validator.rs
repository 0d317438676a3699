// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::validation::{
    Anomaly, DataQuality, IssueKind, ValidationIssue, ValidationResult, ValidationStatus,
};
use crate::domain::services::validation_rules::{RuleRegistry, RuleSet};

const ERROR_PENALTY: f64 = 0.15;
const WARNING_PENALTY: f64 = 0.05;
const ANOMALY_PENALTY: f64 = 0.10;
const MIN_CONFIDENCE: f64 = 0.1;

/// 数据校验器
///
/// 依次执行结构、类型、取值范围、业务规则和异常检测，
/// 并根据问题数量、完整度和新鲜度计算置信度。
/// 对同一输入和同一时钟，输出完全确定。
#[derive(Debug, Clone)]
pub struct DataValidator {
    rules: RuleRegistry,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new(RuleRegistry::with_defaults())
    }
}

impl DataValidator {
    pub fn new(rules: RuleRegistry) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// 以当前时间校验记录
    pub fn validate(
        &self,
        domain: &str,
        record_type: &str,
        record: &Value,
        source_id: &str,
    ) -> ValidationResult {
        self.validate_at(domain, record_type, record, source_id, Utc::now())
    }

    /// 以给定时钟校验记录
    ///
    /// # 参数
    ///
    /// * `domain` - 运动领域，例如 basketball
    /// * `record_type` - 记录类型，例如 venue、weather
    /// * `record` - 原始 JSON 记录
    /// * `source_id` - 数据来源
    /// * `now` - 计算新鲜度使用的时间
    pub fn validate_at(
        &self,
        domain: &str,
        record_type: &str,
        record: &Value,
        source_id: &str,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut anomalies = Vec::new();

        let (completeness, freshness) = match record.as_object() {
            None => {
                errors.push(ValidationIssue::new(
                    None,
                    IssueKind::Malformed,
                    "record is not a JSON object",
                ));
                (0.0, 1.0)
            }
            Some(object) => match self.rules.get(domain, record_type) {
                None => {
                    warnings.push(ValidationIssue::new(
                        None,
                        IssueKind::UnknownRecordType,
                        format!("no rule set registered for {}/{}", domain, record_type),
                    ));
                    (completeness(object, None), freshness(object, now, &mut warnings))
                }
                Some(rules) => {
                    check_structure(object, rules, &mut errors, &mut warnings);
                    check_values(object, rules, &mut errors);
                    for rule in &rules.business_rules {
                        errors.extend(rule(object));
                    }
                    for rule in &rules.anomaly_rules {
                        anomalies.extend(rule(object));
                    }
                    (
                        completeness(object, Some(rules)),
                        freshness(object, now, &mut warnings),
                    )
                }
            },
        };

        let confidence = confidence(
            errors.len(),
            warnings.len(),
            anomalies.len(),
            completeness,
            freshness,
        );
        let quality = quality(&errors, &anomalies, confidence);
        let status = if errors.is_empty() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };

        counter!(
            "validation_results_total",
            "domain" => domain.to_string(),
            "quality" => quality.to_string()
        )
        .increment(1);
        if !anomalies.is_empty() {
            counter!("validation_anomalies_total", "domain" => domain.to_string())
                .increment(anomalies.len() as u64);
        }
        debug!(
            domain,
            record_type,
            source = source_id,
            errors = errors.len(),
            warnings = warnings.len(),
            anomalies = anomalies.len(),
            confidence,
            "Record validated"
        );

        ValidationResult {
            id: result_id(domain, record_type, source_id, record),
            domain: domain.to_string(),
            record_type: record_type.to_string(),
            source_id: source_id.to_string(),
            status,
            errors,
            warnings,
            anomalies,
            completeness,
            freshness,
            confidence,
            quality,
        }
    }
}

/// 结果 id 只依赖输入内容；serde_json 的对象键有序，序列化结果稳定
fn result_id(domain: &str, record_type: &str, source_id: &str, record: &Value) -> Uuid {
    let name = format!("{}|{}|{}|{}", domain, record_type, source_id, record);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

fn check_structure(
    object: &Map<String, Value>,
    rules: &RuleSet,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<ValidationIssue>,
) {
    for rule in rules.fields.iter().filter(|r| r.required) {
        match object.get(&rule.name) {
            None | Some(Value::Null) => errors.push(ValidationIssue::field(
                &rule.name,
                IssueKind::MissingField,
                format!("required field '{}' is missing", rule.name),
            )),
            Some(_) => {}
        }
    }
    for key in object.keys() {
        if rules.rule(key).is_none() {
            warnings.push(ValidationIssue::field(
                key,
                IssueKind::UnexpectedField,
                format!("unexpected field '{}'", key),
            ));
        }
    }
}

fn check_values(object: &Map<String, Value>, rules: &RuleSet, errors: &mut Vec<ValidationIssue>) {
    for rule in &rules.fields {
        let value = match object.get(&rule.name) {
            None | Some(Value::Null) => continue,
            Some(value) => value,
        };

        if !rule.field_type.matches(value) {
            errors.push(ValidationIssue::field(
                &rule.name,
                IssueKind::TypeMismatch,
                format!("field '{}' should be {}", rule.name, rule.field_type.name()),
            ));
            continue;
        }

        if let Some(number) = value.as_f64() {
            let below = rule.min.map(|min| number < min).unwrap_or(false);
            let above = rule.max.map(|max| number > max).unwrap_or(false);
            if below || above {
                errors.push(ValidationIssue::field(
                    &rule.name,
                    IssueKind::OutOfRange,
                    format!(
                        "field '{}' value {} outside [{}, {}]",
                        rule.name,
                        number,
                        rule.min.unwrap_or(f64::NEG_INFINITY),
                        rule.max.unwrap_or(f64::INFINITY)
                    ),
                ));
            }
        }

        if let (Some(allowed), Some(text)) = (&rule.allowed, value.as_str()) {
            if !allowed.iter().any(|a| a == text) {
                errors.push(ValidationIssue::field(
                    &rule.name,
                    IssueKind::InvalidValue,
                    format!("field '{}' value '{}' not in {:?}", rule.name, text, allowed),
                ));
            }
        }
    }
}

/// 完整度：必填字段与实际出现字段中非空值的占比
fn completeness(object: &Map<String, Value>, rules: Option<&RuleSet>) -> f64 {
    let mut total = 0usize;
    let mut filled = 0usize;
    if let Some(rules) = rules {
        for rule in rules.fields.iter().filter(|r| r.required) {
            if !object.contains_key(&rule.name) {
                total += 1;
            }
        }
    }
    for value in object.values() {
        total += 1;
        if !value.is_null() {
            filled += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    filled as f64 / total as f64
}

/// 新鲜度：根据 `timestamp` 字段的年龄分段衰减，未提供时视为新鲜
fn freshness(object: &Map<String, Value>, now: DateTime<Utc>, warnings: &mut Vec<ValidationIssue>) -> f64 {
    let raw = match object.get("timestamp").and_then(Value::as_str) {
        Some(raw) => raw,
        None => return 1.0,
    };
    let timestamp = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => {
            warnings.push(ValidationIssue::field(
                "timestamp",
                IssueKind::StaleTimestamp,
                format!("timestamp '{}' is not RFC 3339", raw),
            ));
            return 1.0;
        }
    };
    let age_hours = (now - timestamp).num_seconds().max(0) as f64 / 3600.0;
    if age_hours <= 1.0 {
        1.0
    } else if age_hours <= 6.0 {
        0.95
    } else if age_hours <= 24.0 {
        0.85
    } else if age_hours <= 72.0 {
        0.7
    } else {
        0.5
    }
}

fn confidence(errors: usize, warnings: usize, anomalies: usize, completeness: f64, freshness: f64) -> f64 {
    let base = 1.0
        - ERROR_PENALTY * errors as f64
        - WARNING_PENALTY * warnings as f64
        - ANOMALY_PENALTY * anomalies as f64;
    (base * completeness * freshness).clamp(MIN_CONFIDENCE, 1.0)
}

fn quality(errors: &[ValidationIssue], anomalies: &[Anomaly], confidence: f64) -> DataQuality {
    if !errors.is_empty() {
        DataQuality::Poor
    } else if confidence >= 0.95 && anomalies.is_empty() {
        DataQuality::Excellent
    } else if confidence >= 0.8 {
        DataQuality::Good
    } else if confidence >= 0.6 {
        DataQuality::Acceptable
    } else {
        DataQuality::Poor
    }
}

#[cfg(test)]
#[path = "data_validator_test.rs"]
mod tests;
