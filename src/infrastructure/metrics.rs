// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;
use crate::utils::errors::WorkerError;

/// 安装 Prometheus 导出器
///
/// 未启用时直接返回；监听地址被占用时只记录警告，便于开发和测试时重复启动
pub fn init_metrics(settings: &MetricsSettings) -> Result<(), WorkerError> {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = settings.listen_addr.parse().map_err(|e| {
        WorkerError::Metrics(format!("invalid metrics address {}: {}", settings.listen_addr, e))
    })?;

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return Ok(());
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// 注册指标说明
pub fn describe_metrics() {
    describe_counter!("transport_requests_total", "Fetches issued per endpoint and result");
    describe_histogram!(
        "transport_request_duration_seconds",
        Unit::Seconds,
        "Fetch latency per endpoint"
    );
    describe_gauge!("transport_active_endpoints", "Endpoints currently eligible for selection");
    describe_counter!("transport_endpoint_bans_total", "Endpoints moved into quarantine");

    describe_counter!("source_requests_total", "Requests recorded per source and result");
    describe_gauge!("source_health_score", "Current 0-100 health score per source");
    describe_counter!("source_alerts_total", "Alerts raised per source, type and severity");

    describe_gauge!("collection_queue_depth", "Jobs waiting for dispatch");
    describe_counter!("collection_jobs_enqueued_total", "Jobs admitted to the queue");
    describe_counter!("collection_jobs_total", "Finished jobs per domain and outcome");
    describe_counter!("collection_job_retries_total", "Retries scheduled after retryable failures");
    describe_histogram!(
        "collection_job_duration_seconds",
        Unit::Seconds,
        "Time from dispatch to settlement per job"
    );

    describe_counter!("validation_results_total", "Validation verdicts per domain and quality");
    describe_counter!("validation_anomalies_total", "Anomalies detected per domain");

    describe_counter!("prediction_cache_requests_total", "Cache lookups per kind and result");
    describe_gauge!("prediction_cache_entries", "Entries held by the prediction cache");
    describe_counter!("intelligence_requests_total", "Processed requests per domain and result");
    describe_histogram!(
        "intelligence_overall_confidence",
        "Overall confidence of produced bundles"
    );

    describe_counter!("alert_webhook_deliveries_total", "Alert webhook deliveries per result");
}
