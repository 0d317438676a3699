// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{basketball_routes, test_settings, ScriptedEngine};
use async_trait::async_trait;
use sportintel::application::dto::CollectionRequest;
use sportintel::application::pipeline::IntelligencePipeline;
use sportintel::domain::models::job::EntityRef;
use sportintel::domain::models::transport::{EndpointStatus, ProxyMode};
use sportintel::engines::traits::{FetchEngine, FetchRequest, FetchResponse, TransportError};
use std::sync::Arc;

const DEAD_PROXY: &str = "http://dead.proxy.test:8080";
const LIVE_PROXY: &str = "http://live.proxy.test:8080";

/// 经由指定代理的请求一律连接失败，其余交给内层引擎
struct ProxyGate {
    inner: Arc<ScriptedEngine>,
    dead_proxy: String,
}

#[async_trait]
impl FetchEngine for ProxyGate {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        if request.proxy.as_ref().map(|p| p.url.as_str()) == Some(self.dead_proxy.as_str()) {
            return Err(TransportError::Connection("proxy refused connection".to_string()));
        }
        self.inner.fetch(request).await
    }

    fn name(&self) -> &'static str {
        "proxy-gate"
    }
}

fn free_proxy_pipeline(inner: &Arc<ScriptedEngine>) -> IntelligencePipeline {
    let mut settings = test_settings();
    settings.transport.mode = ProxyMode::Free;
    settings.transport.max_failures = 2;
    settings.transport.free_proxies = vec![DEAD_PROXY.to_string(), LIVE_PROXY.to_string()];
    let engine = Arc::new(ProxyGate {
        inner: inner.clone(),
        dead_proxy: DEAD_PROXY.to_string(),
    });
    IntelligencePipeline::with_engine(settings, engine).unwrap()
}

#[tokio::test]
async fn test_dead_proxy_is_quarantined_and_requests_still_succeed() {
    let inner = Arc::new(ScriptedEngine::new());
    basketball_routes(&inner);
    let pipeline = free_proxy_pipeline(&inner);

    let bundle = pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g1")))
        .await
        .unwrap();
    assert!(bundle.failures.is_empty());
    assert_eq!(bundle.evaluation_order.len(), 5);

    let transport = pipeline.transport();
    let dead = transport.endpoint("pool-0").unwrap();
    assert_eq!(dead.status, EndpointStatus::Banned);
    assert_eq!(dead.failure_count, 2);
    assert_eq!(transport.endpoint("pool-1").unwrap().status, EndpointStatus::Active);

    let stats = transport.stats();
    assert_eq!(stats.mode, "free");
    assert_eq!(stats.total_endpoints, 3);
    assert_eq!(stats.active_endpoints, 1);
    assert_eq!(stats.banned_endpoints, 1);
    assert_eq!(stats.total_failures, 2);

    assert!(inner
        .proxies_used()
        .iter()
        .all(|p| p.as_deref() == Some(LIVE_PROXY)));
}

#[tokio::test]
async fn test_quarantined_proxy_returns_after_reinstate() {
    let inner = Arc::new(ScriptedEngine::new());
    basketball_routes(&inner);
    let pipeline = free_proxy_pipeline(&inner);
    pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g1")))
        .await
        .unwrap();

    let transport = pipeline.transport();
    assert!(transport.reinstate("pool-0"));
    assert!(!transport.reinstate("pool-0"));
    let reinstated = transport.endpoint("pool-0").unwrap();
    assert_eq!(reinstated.status, EndpointStatus::Active);
    assert_eq!(reinstated.consecutive_failures, 0);
    assert_eq!(transport.stats().active_endpoints, 2);
}

#[tokio::test]
async fn test_whole_pool_down_falls_back_to_direct() {
    let inner = Arc::new(ScriptedEngine::new());
    basketball_routes(&inner);
    let mut settings = test_settings();
    settings.transport.mode = ProxyMode::Free;
    settings.transport.max_failures = 1;
    settings.transport.free_proxies = vec![DEAD_PROXY.to_string()];
    let engine = Arc::new(ProxyGate {
        inner: inner.clone(),
        dead_proxy: DEAD_PROXY.to_string(),
    });
    let pipeline = IntelligencePipeline::with_engine(settings, engine).unwrap();

    let bundle = pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g4")).with_factors(["venue", "injuries"]))
        .await
        .unwrap();
    assert!(bundle.failures.is_empty());

    let stats = pipeline.transport().stats();
    assert_eq!(stats.active_endpoints, 0);
    assert_eq!(stats.banned_endpoints, 1);
    assert!(inner.proxies_used().iter().all(Option::is_none));
    assert_eq!(pipeline.transport().endpoint("direct").unwrap().success_count, 2);
}
