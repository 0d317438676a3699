// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tracing::{error, warn};

use super::{AlertError, AlertSink};
use crate::domain::models::alert::{Alert, AlertSeverity};

/// 将告警写入结构化日志
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        match alert.severity {
            AlertSeverity::Warning => warn!(
                target: "sportintel::alerts",
                source = %alert.source_id,
                alert_type = %alert.alert_type,
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
            AlertSeverity::Critical => error!(
                target: "sportintel::alerts",
                source = %alert.source_id,
                alert_type = %alert.alert_type,
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}
