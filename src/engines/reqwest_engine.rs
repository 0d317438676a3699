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

use crate::engines::traits::{FetchEngine, FetchRequest, FetchResponse, TransportError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Instant;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; sportintel/0.1)";

/// HTTP 抓取引擎
///
/// 基于reqwest实现，支持直连与带认证的代理
#[derive(Debug, Default, Clone)]
pub struct ReqwestEngine;

impl ReqwestEngine {
    pub fn new() -> Self {
        Self
    }

    fn build_client(request: &FetchRequest) -> Result<reqwest::Client, TransportError> {
        // Each request gets a fresh client so proxy and cookie state never leak between endpoints
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request.timeout)
            .cookie_store(true);

        if let Some(target) = &request.proxy {
            let mut proxy = reqwest::Proxy::all(&target.url)
                .map_err(|e| TransportError::InvalidProxy(format!("{}: {}", target.url, e)))?;
            if let Some(credentials) = &target.credentials {
                proxy = proxy.basic_auth(&credentials.username, &credentials.password);
            }
            builder = builder.proxy(proxy);
        }

        Ok(builder.build()?)
    }
}

#[async_trait]
impl FetchEngine for ReqwestEngine {
    /// 执行HTTP请求
    ///
    /// # 参数
    ///
    /// * `request` - 抓取请求
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResponse)` - 2xx 响应
    /// * `Err(TransportError)` - 网络错误或非 2xx 状态码
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let mut headers = HeaderMap::new();
        for (k, v) in &request.headers {
            if let (Ok(k), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(k, v);
            }
        }

        let client = Self::build_client(request)?;

        let start = Instant::now();
        let response = client.get(&request.url).headers(headers).send().await?;

        let status_code = response.status().as_u16();
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(status_code));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("application/json")
            .to_string();

        let mut response_headers = std::collections::HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                response_headers.insert(k.as_str().to_string(), v_str.to_string());
            }
        }

        let body = response.text().await?;

        Ok(FetchResponse {
            status_code,
            body,
            content_type,
            headers: response_headers,
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
