// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::validation::DataQuality;

/// 单个因子对各结果的影响
///
/// `outcomes` 为胜率增量，`magnitudes` 为数值预测（如总分）增量，
/// 二者都会在聚合时乘以因子权重
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorImpact {
    pub outcomes: BTreeMap<String, f64>,
    pub magnitudes: BTreeMap<String, f64>,
    pub summary: String,
}

impl FactorImpact {
    pub fn neutral(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_outcome(mut self, outcome: &str, delta: f64) -> Self {
        *self.outcomes.entry(outcome.to_string()).or_insert(0.0) += delta;
        self
    }

    pub fn with_magnitude(mut self, magnitude: &str, delta: f64) -> Self {
        *self.magnitudes.entry(magnitude.to_string()).or_insert(0.0) += delta;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn outcome(&self, outcome: &str) -> f64 {
        self.outcomes.get(outcome).copied().unwrap_or(0.0)
    }
}

/// 已采集并校验的因子记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRecord {
    pub domain: String,
    pub factor: String,
    pub entity_id: String,
    pub value: Value,
    pub impact: FactorImpact,
    pub weight: f64,
    /// 来自校验结果，校验失败时被压低
    pub confidence: f64,
    pub quality: DataQuality,
    pub source_id: String,
    pub collected_at: DateTime<Utc>,
}
