// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ResponseTime,
    ConsecutiveFailures,
    HealthScore,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertType::ResponseTime => write!(f, "response_time"),
            AlertType::ConsecutiveFailures => write!(f, "consecutive_failures"),
            AlertType::HealthScore => write!(f, "health_score"),
        }
    }
}

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// 数据源健康告警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub source_id: String,
    pub message: String,
    /// 触发时的观测值
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        severity: AlertSeverity,
        source_id: &str,
        value: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let message = format!(
            "{} {} for source {}: observed {:.2}, threshold {:.2}",
            severity, alert_type, source_id, value, threshold
        );
        Self {
            id: Uuid::new_v4(),
            alert_type,
            severity,
            source_id: source_id.to_string(),
            message,
            value,
            threshold,
            timestamp,
        }
    }
}
