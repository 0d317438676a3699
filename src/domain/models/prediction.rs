// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::factor::FactorRecord;
use super::job::EntityRef;

/// 聚合后的预测
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    /// 各结果概率，和为 1
    pub win_probability: BTreeMap<String, f64>,
    /// 数值预测，例如 total_points
    pub magnitudes: BTreeMap<String, f64>,
    /// 概率最高的结果
    pub favorite: Option<String>,
}

/// 采集失败的因子
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorFailure {
    pub factor: String,
    pub error: String,
}

/// 一次请求的完整预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionBundle {
    pub domain: String,
    pub entity: EntityRef,
    pub factors: BTreeMap<String, FactorRecord>,
    /// 成功因子按注册顺序排列
    pub evaluation_order: Vec<String>,
    pub failures: Vec<FactorFailure>,
    pub predictions: Predictions,
    pub overall_confidence: f64,
    pub generated_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl PredictionBundle {
    pub fn factor(&self, name: &str) -> Option<&FactorRecord> {
        self.factors.get(name)
    }

    pub fn win_probability(&self, outcome: &str) -> Option<f64> {
        self.predictions.win_probability.get(outcome).copied()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.generated_at + Duration::seconds(self.ttl_seconds as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}
