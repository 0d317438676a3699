// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::dto::CollectionRequest;
use crate::config::settings::Settings;
use crate::domain::models::alert::Alert;
use crate::domain::models::prediction::PredictionBundle;
use crate::domain::services::data_validator::DataValidator;
use crate::domain::services::factor_collector::CollectorRegistry;
use crate::domain::services::intelligence_engine::{IntelligenceEngine, IntelligenceError};
use crate::engines::health_monitor::SourceHealthMonitor;
use crate::engines::reqwest_engine::ReqwestEngine;
use crate::engines::traits::FetchEngine;
use crate::engines::transport_manager::TransportManager;
use crate::infrastructure::alerts::{LogAlertSink, WebhookAlertSink};
use crate::infrastructure::cache::PredictionCache;
use crate::infrastructure::services::rate_limiting_service_impl::TokenBucketRateLimiter;
use crate::queue::JobScheduler;
use crate::utils::errors::{PipelineError, WorkerError};
use crate::workers::manager::WorkerManager;
use crate::workers::orchestrator::ScrapingOrchestrator;
use crate::workers::recovery_worker::RecoveryWorker;
use crate::workers::webhook_worker::AlertWebhookWorker;

/// 未单独配置限流的数据源使用的每分钟请求数
const DEFAULT_SOURCE_RPM: u32 = 60;

/// 采集与情报管线
///
/// 按配置装配传输层、健康监控、调度器、校验器与情报引擎，
/// 并负责把后台定时器注册到 `WorkerManager`
pub struct IntelligencePipeline {
    settings: Settings,
    transport: Arc<TransportManager>,
    health: Arc<SourceHealthMonitor>,
    orchestrator: Arc<ScrapingOrchestrator>,
    scheduler: Arc<JobScheduler>,
    engine: Arc<IntelligenceEngine>,
    alert_queue: parking_lot::Mutex<Option<mpsc::Receiver<Alert>>>,
    unhealthy_events: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl IntelligencePipeline {
    /// 使用 reqwest 引擎装配管线
    pub fn from_settings(settings: Settings) -> Result<Self, PipelineError> {
        Self::with_engine(settings, Arc::new(ReqwestEngine::new()))
    }

    /// 使用指定的抓取引擎装配管线
    ///
    /// # 参数
    ///
    /// * `settings` - 应用配置
    /// * `fetch` - 底层抓取引擎
    pub fn with_engine(settings: Settings, fetch: Arc<dyn FetchEngine>) -> Result<Self, PipelineError> {
        settings.validate()?;

        let transport = Arc::new(TransportManager::new(fetch, settings.transport.to_config()));
        let health = Arc::new(SourceHealthMonitor::with_sources(
            settings.health.to_config(),
            settings.sources.clone(),
        )?);

        if settings.alerts.log {
            health.register_alert_sink(Arc::new(LogAlertSink));
        }
        let alert_queue = match &settings.alerts.webhook_url {
            Some(_) => {
                let (sink, queue) = WebhookAlertSink::channel(settings.alerts.queue_capacity);
                health.register_alert_sink(Arc::new(sink));
                Some(queue)
            }
            None => None,
        };
        let unhealthy_events = health.subscribe_unhealthy();

        let rate_limiter = Arc::new(TokenBucketRateLimiter::new(
            DEFAULT_SOURCE_RPM,
            settings.orchestrator.refill_interval(),
        ));
        let orchestrator = ScrapingOrchestrator::new(
            transport.clone(),
            health.clone(),
            Arc::new(DataValidator::default()),
            rate_limiter,
            settings.orchestrator.to_config(),
        );

        let cache = Arc::new(PredictionCache::new(settings.cache.to_config()));
        let engine = Arc::new(IntelligenceEngine::new(
            CollectorRegistry::with_defaults()?,
            orchestrator.clone(),
            cache,
            settings.engine.to_config(),
        ));
        let scheduler = Arc::new(JobScheduler::new(orchestrator.clone()));

        info!(
            sources = settings.sources.len(),
            domains = ?engine.domains(),
            "Intelligence pipeline assembled"
        );

        Ok(Self {
            settings,
            transport,
            health,
            orchestrator,
            scheduler,
            engine,
            alert_queue: parking_lot::Mutex::new(alert_queue),
            unhealthy_events: parking_lot::Mutex::new(Some(unhealthy_events)),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transport(&self) -> &Arc<TransportManager> {
        &self.transport
    }

    pub fn health(&self) -> &Arc<SourceHealthMonitor> {
        &self.health
    }

    pub fn orchestrator(&self) -> &Arc<ScrapingOrchestrator> {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub fn engine(&self) -> &Arc<IntelligenceEngine> {
        &self.engine
    }

    /// 处理一次预测请求
    pub async fn process(&self, request: &CollectionRequest) -> Result<PredictionBundle, IntelligenceError> {
        self.engine.process(request).await
    }

    /// 注册所有后台任务，只能调用一次
    pub fn start_background(&self, manager: &mut WorkerManager) -> Result<(), PipelineError> {
        let transport_settings = &self.settings.transport;

        let transport = self.transport.clone();
        manager.spawn_periodic(
            "transport-probe",
            Duration::from_secs(transport_settings.probe_interval_secs.max(1)),
            move || {
                let transport = transport.clone();
                async move {
                    let summary = transport.probe().await;
                    debug!(
                        probed = summary.probed,
                        healthy = summary.healthy,
                        reinstated = summary.reinstated,
                        "Transport probe finished"
                    );
                }
            },
        );

        let transport = self.transport.clone();
        manager.spawn_periodic(
            "transport-rotation",
            Duration::from_secs(transport_settings.rotation_interval_secs.max(1)),
            move || {
                let transport = transport.clone();
                async move {
                    if transport.rotate() {
                        info!("Transport quarantine reset by rotation policy");
                    }
                }
            },
        );

        let health = self.health.clone();
        manager.spawn_periodic(
            "health-windows",
            Duration::from_secs(self.settings.health.window_roll_interval_secs.max(1)),
            move || {
                let health = health.clone();
                async move {
                    if health.roll_windows(Utc::now()) > 0 {
                        let summary = health.summary();
                        info!(
                            total = summary.total,
                            healthy = summary.healthy,
                            degraded = summary.degraded,
                            unhealthy = summary.unhealthy,
                            average_score = summary.average_health_score,
                            "Hourly source health report"
                        );
                    }
                }
            },
        );

        let orchestrator = self.orchestrator.clone();
        manager.spawn_periodic(
            "rate-limit-refill",
            self.settings.orchestrator.refill_interval(),
            move || {
                let orchestrator = orchestrator.clone();
                async move { orchestrator.refill_rate_limits() }
            },
        );

        let cache = self.engine.cache().clone();
        manager.spawn_periodic(
            "cache-purge",
            Duration::from_secs(self.settings.cache.purge_interval_secs.max(1)),
            move || {
                let cache = cache.clone();
                async move {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        debug!(purged, "Expired cache entries purged");
                    }
                }
            },
        );

        let recovery = Arc::new(RecoveryWorker::new(
            self.transport.clone(),
            self.health.clone(),
            self.settings.health.reconnect_attempts,
            Duration::from_secs(self.settings.health.reconnect_backoff_secs),
        ));
        if let Some(events) = self.unhealthy_events.lock().take() {
            let signal = manager.shutdown_signal();
            manager.spawn("source-recovery", recovery.clone().run(events, signal));
        }

        manager.spawn_periodic(
            "source-probe",
            Duration::from_secs(self.settings.health.probe_interval_secs.max(1)),
            move || {
                let recovery = recovery.clone();
                async move {
                    let reconnected = recovery.probe_unhealthy().await;
                    if reconnected > 0 {
                        info!(reconnected, "Periodic probe recovered unhealthy sources");
                    }
                }
            },
        );

        if let Some(queue) = self.alert_queue.lock().take() {
            let alerts = &self.settings.alerts;
            if let (Some(url), Some(secret)) = (&alerts.webhook_url, &alerts.webhook_secret) {
                let worker = AlertWebhookWorker::new(
                    url.clone(),
                    secret.clone(),
                    alerts.max_delivery_attempts,
                    Duration::from_secs(alerts.delivery_timeout_secs),
                )
                .map_err(|e| WorkerError::InternalError(format!("{:#}", e)))?;
                let signal = manager.shutdown_signal();
                manager.spawn("alert-webhook", worker.run(queue, signal));
            }
        }

        manager.track("factor-cache-listener", self.engine.spawn_cache_listener());

        for warmup in &self.settings.engine.warmup {
            let template = self
                .engine
                .warmup_template(&warmup.domain, &warmup.factor, warmup.entity.clone())?;
            let schedule_id = self
                .scheduler
                .schedule_recurring(template, Duration::from_secs(warmup.cadence_secs));
            info!(
                %schedule_id,
                domain = %warmup.domain,
                factor = %warmup.factor,
                entity = %warmup.entity.id,
                "Warm-up schedule registered"
            );
        }

        info!(tasks = manager.len(), "Background tasks started");
        Ok(())
    }

    /// 停止周期调度并让所有未完成任务失败返回
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.orchestrator.shutdown();
        let stats = self.orchestrator.stats();
        if stats.queued > 0 || stats.running > 0 {
            warn!(
                queued = stats.queued,
                running = stats.running,
                "Pipeline stopped with unfinished jobs"
            );
        }
        info!("Intelligence pipeline stopped");
    }
}
