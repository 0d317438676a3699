// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::transport::ProxyCredentials;

/// 传输错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 超时
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    /// 连接失败
    #[error("Connection failed: {0}")]
    Connection(String),
    /// 上游返回非成功状态码
    #[error("Upstream returned HTTP {0}")]
    HttpStatus(u16),
    /// 代理配置无效
    #[error("Invalid proxy: {0}")]
    InvalidProxy(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl TransportError {
    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 超时、连接失败、429 与 5xx 可重试，其余不可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::RequestFailed(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            TransportError::Timeout(_) => true,
            TransportError::Connection(_) => true,
            TransportError::HttpStatus(status) => *status == 429 || *status >= 500,
            TransportError::InvalidProxy(_) => false,
            TransportError::Other(_) => false,
        }
    }
}

/// 请求经由的代理
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub url: String,
    pub credentials: Option<ProxyCredentials>,
}

/// 抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 请求头
    pub headers: HashMap<String, String>,
    /// 超时时间
    pub timeout: Duration,
    /// 代理配置，None 表示直连
    pub proxy: Option<ProxyTarget>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Accept".to_string(), "application/json".to_string());
        Self {
            url: url.into(),
            headers,
            timeout: Duration::from_secs(10),
            proxy: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}

/// 抓取响应
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 响应内容
    pub body: String,
    /// 内容类型
    pub content_type: String,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

impl FetchResponse {
    /// 构造一个 200 JSON 响应
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: body.into(),
            content_type: "application/json".to_string(),
            headers: HashMap::new(),
            response_time_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// 抓取引擎特质
///
/// 负责单次 HTTP 交互；端点选择、健康统计和重试由上层处理
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// 执行请求
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}
