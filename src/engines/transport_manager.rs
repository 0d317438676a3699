// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use futures::future::join_all;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::models::transport::{
    EndpointStatus, ProxyDefinition, ProxyMode, TransportEndpoint, TransportKind,
};
use crate::engines::traits::{FetchEngine, FetchRequest, FetchResponse, ProxyTarget, TransportError};

/// 传输层配置
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// 代理模式
    pub mode: ProxyMode,
    /// 连续失败多少次后隔离端点
    pub max_failures: u32,
    /// 单个端点的请求超时
    pub endpoint_timeout: Duration,
    /// 探测使用的 URL
    pub probe_url: String,
    /// 探测超时
    pub probe_timeout: Duration,
    /// 付费代理是否永不隔离
    pub premium_never_ban: bool,
    /// 免费代理列表
    pub free_proxies: Vec<String>,
    /// 付费代理列表
    pub premium_proxies: Vec<ProxyDefinition>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Direct,
            max_failures: 3,
            endpoint_timeout: Duration::from_secs(15),
            probe_url: "https://httpbin.org/status/200".to_string(),
            probe_timeout: Duration::from_secs(10),
            premium_never_ban: false,
            free_proxies: Vec::new(),
            premium_proxies: Vec::new(),
        }
    }
}

/// 传输池统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportStats {
    pub mode: String,
    pub total_endpoints: usize,
    pub active_endpoints: usize,
    pub banned_endpoints: usize,
    pub total_requests: u64,
    pub total_failures: u64,
    pub endpoints: Vec<EndpointSummary>,
}

/// 单个端点摘要
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub id: String,
    pub kind: TransportKind,
    pub status: EndpointStatus,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_response_time_ms: f64,
}

/// 一轮探测的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub probed: usize,
    pub healthy: usize,
    pub reinstated: usize,
}

/// 端点池状态
///
/// 下标 0 固定为直连端点；`healthy` 和 `quarantine` 互斥地保存其余端点的下标
#[derive(Debug)]
struct PoolState {
    endpoints: Vec<TransportEndpoint>,
    healthy: Vec<usize>,
    quarantine: BTreeSet<usize>,
    cursor: usize,
}

impl PoolState {
    fn position(&self, endpoint_id: &str) -> Option<usize> {
        self.endpoints.iter().position(|e| e.id == endpoint_id)
    }

    fn pooled_len(&self) -> usize {
        self.endpoints.len() - 1
    }

    fn reinstate(&mut self, idx: usize) -> bool {
        if !self.quarantine.remove(&idx) {
            return false;
        }
        let endpoint = &mut self.endpoints[idx];
        endpoint.status = EndpointStatus::Active;
        endpoint.consecutive_failures = 0;
        endpoint.banned_at = None;
        self.healthy.push(idx);
        true
    }
}

/// 传输管理器
///
/// 维护直连与代理端点池，轮询选择健康端点，按结果更新端点统计，
/// 连续失败达到阈值的端点被隔离，直到探测成功或轮换重置
pub struct TransportManager {
    engine: Arc<dyn FetchEngine>,
    state: parking_lot::Mutex<PoolState>,
    config: TransportConfig,
}

impl TransportManager {
    /// 创建新的传输管理器
    ///
    /// # 参数
    ///
    /// * `engine` - 底层抓取引擎
    /// * `config` - 传输配置
    pub fn new(engine: Arc<dyn FetchEngine>, config: TransportConfig) -> Self {
        let timeout = config.endpoint_timeout;
        let mut endpoints = vec![TransportEndpoint::direct(timeout)];

        match config.mode {
            ProxyMode::Direct => {}
            ProxyMode::Free => {
                for (i, url) in config.free_proxies.iter().enumerate() {
                    endpoints.push(TransportEndpoint::proxied(
                        format!("pool-{}", i),
                        TransportKind::Pooled,
                        url.clone(),
                        None,
                        timeout,
                    ));
                }
            }
            ProxyMode::Premium => {
                for (i, proxy) in config.premium_proxies.iter().enumerate() {
                    endpoints.push(TransportEndpoint::proxied(
                        format!("premium-{}", i),
                        TransportKind::Premium,
                        proxy.url.clone(),
                        proxy.credentials(),
                        timeout,
                    ));
                }
            }
        }

        let healthy = (1..endpoints.len()).collect();
        info!(
            mode = ?config.mode,
            proxies = endpoints.len() - 1,
            "Transport pool initialized"
        );
        gauge!("transport_active_endpoints").set((endpoints.len() - 1) as f64);

        Self {
            engine,
            state: parking_lot::Mutex::new(PoolState {
                endpoints,
                healthy,
                quarantine: BTreeSet::new(),
                cursor: 0,
            }),
            config,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// 轮询选择下一个健康端点
    ///
    /// 没有可用代理时回落到直连端点，隔离中的端点永远不会被返回
    pub fn select_endpoint(&self) -> TransportEndpoint {
        let mut state = self.state.lock();
        let idx = if state.healthy.is_empty() {
            0
        } else {
            let pos = state.cursor % state.healthy.len();
            state.cursor = (pos + 1) % state.healthy.len();
            state.healthy[pos]
        };
        let endpoint = &mut state.endpoints[idx];
        endpoint.last_used_at = Some(Utc::now());
        endpoint.clone()
    }

    /// 通过指定端点执行请求并记录结果
    ///
    /// 超时取请求超时与端点超时的较小值；非 2xx 响应按失败处理
    pub async fn execute(
        &self,
        endpoint: &TransportEndpoint,
        mut request: FetchRequest,
    ) -> Result<FetchResponse, TransportError> {
        request.proxy = endpoint.proxy_url.as_ref().map(|url| ProxyTarget {
            url: url.clone(),
            credentials: endpoint.credentials.clone(),
        });
        let timeout = request.timeout.min(endpoint.timeout());
        request.timeout = timeout;

        let start = Instant::now();
        let result = match tokio::time::timeout(timeout, self.engine.fetch(&request)).await {
            Ok(Ok(response)) if !response.is_success() => {
                Err(TransportError::HttpStatus(response.status_code))
            }
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };
        let latency = start.elapsed();

        histogram!("transport_request_duration_seconds", "endpoint" => endpoint.id.clone())
            .record(latency.as_secs_f64());

        match &result {
            Ok(_) => self.report_outcome(&endpoint.id, true, latency, None),
            Err(e) => self.report_outcome(&endpoint.id, false, latency, Some(&e.to_string())),
        }
        result
    }

    /// 记录端点请求结果
    ///
    /// # 参数
    ///
    /// * `endpoint_id` - 端点标识
    /// * `success` - 是否成功
    /// * `latency` - 请求耗时
    /// * `error` - 失败时的错误信息
    pub fn report_outcome(
        &self,
        endpoint_id: &str,
        success: bool,
        latency: Duration,
        error: Option<&str>,
    ) {
        let mut state = self.state.lock();
        let Some(idx) = state.position(endpoint_id) else {
            warn!(endpoint = endpoint_id, "Outcome reported for unknown endpoint");
            return;
        };

        let max_failures = self.config.max_failures;
        let never_ban = self.config.premium_never_ban;
        let endpoint = &mut state.endpoints[idx];
        if success {
            endpoint.success_count += 1;
            endpoint.consecutive_failures = 0;
        } else {
            endpoint.failure_count += 1;
            endpoint.consecutive_failures += 1;
            endpoint.last_error = error.map(str::to_string);
        }
        let n = endpoint.total_requests() as f64;
        let latency_ms = latency.as_secs_f64() * 1000.0;
        endpoint.avg_response_time_ms += (latency_ms - endpoint.avg_response_time_ms) / n;

        counter!(
            "transport_requests_total",
            "endpoint" => endpoint_id.to_string(),
            "outcome" => if success { "success" } else { "failure" }
        )
        .increment(1);

        let should_ban = !success
            && !endpoint.is_direct()
            && endpoint.status == EndpointStatus::Active
            && endpoint.consecutive_failures >= max_failures;
        if !should_ban {
            return;
        }
        if endpoint.kind == TransportKind::Premium && never_ban {
            debug!(
                endpoint = endpoint_id,
                failures = endpoint.consecutive_failures,
                "Premium endpoint over failure threshold, keeping it in rotation"
            );
            return;
        }

        endpoint.status = EndpointStatus::Banned;
        endpoint.banned_at = Some(Utc::now());
        let failures = endpoint.consecutive_failures;
        state.healthy.retain(|&i| i != idx);
        state.quarantine.insert(idx);
        counter!("transport_endpoint_bans_total").increment(1);
        gauge!("transport_active_endpoints").set(state.healthy.len() as f64);
        warn!(
            endpoint = endpoint_id,
            failures,
            "Endpoint quarantined after consecutive failures"
        );
    }

    /// 手动恢复一个被隔离的端点
    pub fn reinstate(&self, endpoint_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(idx) = state.position(endpoint_id) else {
            return false;
        };
        let reinstated = state.reinstate(idx);
        if reinstated {
            gauge!("transport_active_endpoints").set(state.healthy.len() as f64);
            info!(endpoint = endpoint_id, "Endpoint reinstated");
        }
        reinstated
    }

    /// 探测所有代理端点
    ///
    /// 探测成功的隔离端点会被恢复；探测失败计入端点统计
    pub async fn probe(&self) -> ProbeSummary {
        let targets: Vec<TransportEndpoint> = {
            let state = self.state.lock();
            state.endpoints.iter().skip(1).cloned().collect()
        };
        if targets.is_empty() {
            return ProbeSummary::default();
        }

        let probes = targets.iter().map(|endpoint| {
            let request = FetchRequest::new(self.config.probe_url.clone())
                .with_timeout(self.config.probe_timeout);
            async move {
                let was_banned = endpoint.is_banned();
                let ok = self.execute(endpoint, request).await.is_ok();
                (endpoint.id.clone(), was_banned, ok)
            }
        });
        let results = join_all(probes).await;

        let mut summary = ProbeSummary {
            probed: results.len(),
            ..Default::default()
        };
        for (id, was_banned, ok) in results {
            if ok {
                summary.healthy += 1;
                if was_banned && self.reinstate(&id) {
                    summary.reinstated += 1;
                }
            }
        }
        debug!(?summary, "Transport probe finished");
        summary
    }

    /// 轮换检查：超过一半的代理被隔离时重置整个隔离区
    pub fn rotate(&self) -> bool {
        let mut state = self.state.lock();
        let pooled = state.pooled_len();
        if pooled == 0 || state.quarantine.len() * 2 <= pooled {
            return false;
        }
        let banned: Vec<usize> = state.quarantine.iter().copied().collect();
        for idx in &banned {
            state.reinstate(*idx);
        }
        gauge!("transport_active_endpoints").set(state.healthy.len() as f64);
        warn!(
            reinstated = banned.len(),
            pool = pooled,
            "Majority of proxy pool quarantined, resetting quarantine"
        );
        true
    }

    /// 获取端点快照
    pub fn endpoint(&self, endpoint_id: &str) -> Option<TransportEndpoint> {
        let state = self.state.lock();
        state.position(endpoint_id).map(|idx| state.endpoints[idx].clone())
    }

    /// 获取传输池统计
    pub fn stats(&self) -> TransportStats {
        let state = self.state.lock();
        let endpoints: Vec<EndpointSummary> = state
            .endpoints
            .iter()
            .map(|e| EndpointSummary {
                id: e.id.clone(),
                kind: e.kind,
                status: e.status,
                success_count: e.success_count,
                failure_count: e.failure_count,
                avg_response_time_ms: e.avg_response_time_ms,
            })
            .collect();
        TransportStats {
            mode: format!("{:?}", self.config.mode).to_lowercase(),
            total_endpoints: state.endpoints.len(),
            active_endpoints: state.healthy.len(),
            banned_endpoints: state.quarantine.len(),
            total_requests: state.endpoints.iter().map(|e| e.total_requests()).sum(),
            total_failures: state.endpoints.iter().map(|e| e.failure_count).sum(),
            endpoints,
        }
    }
}
