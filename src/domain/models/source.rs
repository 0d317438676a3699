// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 数据源优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    High,
    #[default]
    Medium,
    Low,
}

/// 数据源健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// 尚无请求记录
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceStatus::Unknown => "unknown",
            SourceStatus::Healthy => "healthy",
            SourceStatus::Degraded => "degraded",
            SourceStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

/// 数据源定义（来自配置）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// 数据源唯一标识
    pub id: String,
    /// 基础URL
    pub base_url: String,
    /// 数据领域类型，例如 venue、weather
    pub domain_type: String,
    #[serde(default)]
    pub priority: SourcePriority,
    /// 每分钟允许的请求数，0 表示不限制
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// 请求超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 期望响应时间（毫秒），用于健康评分
    #[serde(default = "default_expected_response_time_ms")]
    pub expected_response_time_ms: u64,
}

fn default_rate_limit() -> u32 {
    60
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_expected_response_time_ms() -> u64 {
    2_000
}

impl SourceDefinition {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, domain_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            domain_type: domain_type.into(),
            priority: SourcePriority::default(),
            rate_limit: default_rate_limit(),
            timeout_ms: default_timeout_ms(),
            expected_response_time_ms: default_expected_response_time_ms(),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_expected_response_time_ms(mut self, ms: u64) -> Self {
        self.expected_response_time_ms = ms;
        self
    }
}

/// 外部数据源及其健康统计
///
/// 由 `SourceHealthMonitor` 独占更新，其余组件只读取快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub base_url: String,
    pub domain_type: String,
    pub priority: SourcePriority,
    pub rate_limit: u32,
    pub timeout_ms: u64,
    pub expected_response_time_ms: u64,
    pub status: SourceStatus,
    /// 是否参与调度
    pub active: bool,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    /// 成功率，范围 [0, 1]
    pub reliability: f64,
    /// 健康评分，范围 [0, 100]
    pub health_score: f64,
    /// 响应时间指数移动平均（毫秒）
    pub avg_response_time_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_status_change: DateTime<Utc>,
}

impl Source {
    /// 根据配置定义创建数据源
    ///
    /// 新数据源处于 Unknown 状态，健康评分为满分
    pub fn from_definition(definition: SourceDefinition) -> Self {
        Self {
            id: definition.id,
            base_url: definition.base_url,
            domain_type: definition.domain_type,
            priority: definition.priority,
            rate_limit: definition.rate_limit,
            timeout_ms: definition.timeout_ms,
            expected_response_time_ms: definition.expected_response_time_ms,
            status: SourceStatus::Unknown,
            active: true,
            consecutive_failures: 0,
            total_requests: 0,
            successful_requests: 0,
            reliability: 1.0,
            health_score: 100.0,
            avg_response_time_ms: 0.0,
            last_success_at: None,
            last_failure_at: None,
            last_error: None,
            last_status_change: Utc::now(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn failed_requests(&self) -> u64 {
        self.total_requests - self.successful_requests
    }
}
