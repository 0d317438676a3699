// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 代理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// 仅直连
    #[default]
    Direct,
    /// 免费代理池
    Free,
    /// 付费代理
    Premium,
}

/// 传输端点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Direct,
    Pooled,
    Premium,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Direct => write!(f, "direct"),
            TransportKind::Pooled => write!(f, "pooled"),
            TransportKind::Premium => write!(f, "premium"),
        }
    }
}

/// 端点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Active,
    /// 已隔离，不会被选中
    Banned,
}

/// 代理认证信息
#[derive(Clone, Serialize, Deserialize)]
pub struct ProxyCredentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 付费代理配置项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyDefinition {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyDefinition {
    pub fn credentials(&self) -> Option<ProxyCredentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(ProxyCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

/// 传输端点：直连或一个代理
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportEndpoint {
    pub id: String,
    pub kind: TransportKind,
    pub proxy_url: Option<String>,
    pub credentials: Option<ProxyCredentials>,
    pub status: EndpointStatus,
    pub success_count: u64,
    pub failure_count: u64,
    /// 自上次成功以来的失败次数
    pub consecutive_failures: u32,
    pub avg_response_time_ms: f64,
    pub timeout_ms: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub banned_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl TransportEndpoint {
    /// 直连端点，永远不会被隔离
    pub fn direct(timeout: Duration) -> Self {
        Self::build("direct".to_string(), TransportKind::Direct, None, None, timeout)
    }

    pub fn proxied(
        id: impl Into<String>,
        kind: TransportKind,
        proxy_url: impl Into<String>,
        credentials: Option<ProxyCredentials>,
        timeout: Duration,
    ) -> Self {
        Self::build(id.into(), kind, Some(proxy_url.into()), credentials, timeout)
    }

    fn build(
        id: String,
        kind: TransportKind,
        proxy_url: Option<String>,
        credentials: Option<ProxyCredentials>,
        timeout: Duration,
    ) -> Self {
        Self {
            id,
            kind,
            proxy_url,
            credentials,
            status: EndpointStatus::Active,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            avg_response_time_ms: 0.0,
            timeout_ms: timeout.as_millis() as u64,
            last_used_at: None,
            banned_at: None,
            last_error: None,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == TransportKind::Direct
    }

    pub fn is_banned(&self) -> bool {
        self.status == EndpointStatus::Banned
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn total_requests(&self) -> u64 {
        self.success_count + self.failure_count
    }
}
