// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{basketball_routes, eventually, test_settings, ScriptedEngine};
use chrono::Utc;
use sportintel::application::dto::CollectionRequest;
use sportintel::application::pipeline::IntelligencePipeline;
use sportintel::domain::models::job::EntityRef;
use sportintel::domain::models::source::SourceStatus;
use sportintel::workers::manager::WorkerManager;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_summary_reflects_collected_sources() {
    let engine = Arc::new(ScriptedEngine::new());
    engine.status("/basketball/travel/", 502);
    basketball_routes(&engine);
    let mut settings = test_settings();
    settings.orchestrator.max_attempts = 1;
    let pipeline = IntelligencePipeline::with_engine(settings, engine).unwrap();

    let bundle = pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g1")))
        .await
        .unwrap();
    assert_eq!(bundle.failures.len(), 1);

    let summary = pipeline.health().summary();
    assert_eq!(summary.total, 6);
    // officials, venues, schedules, injuries
    assert_eq!(summary.healthy, 4);
    assert_eq!(summary.unhealthy, 1);
    assert_eq!(summary.unknown, 1);
    assert_eq!(pipeline.health().unhealthy_sources(), vec!["travel".to_string()]);

    let report = pipeline.health().performance_report("schedules").unwrap();
    let requests: u64 = report.hourly.iter().map(|s| s.requests).sum();
    assert_eq!(requests, 1);
    assert_eq!(report.source.total_requests, 1);
}

#[tokio::test]
async fn test_deactivated_source_fails_factor_without_fetch() {
    let engine = Arc::new(ScriptedEngine::new());
    basketball_routes(&engine);
    let pipeline = IntelligencePipeline::with_engine(test_settings(), engine.clone()).unwrap();
    pipeline.health().deactivate("injuries").unwrap();

    let bundle = pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g1")).with_factors(["venue", "injuries"]))
        .await
        .unwrap();
    assert_eq!(bundle.evaluation_order, vec!["venue"]);
    assert_eq!(bundle.failures.len(), 1);
    assert_eq!(bundle.failures[0].factor, "injuries");
    assert_eq!(engine.calls_matching("/injuries/"), 0);
    assert_eq!(pipeline.health().summary().inactive, 1);

    pipeline.health().activate("injuries").unwrap();
    let refreshed = pipeline
        .process(
            &CollectionRequest::new("basketball", EntityRef::new("g1"))
                .with_factors(["venue", "injuries"])
                .refreshing(),
        )
        .await
        .unwrap();
    assert!(refreshed.failures.is_empty());
    assert_eq!(engine.calls_matching("/injuries/"), 1);
}

#[tokio::test]
async fn test_unhealthy_source_is_reconnected_in_background() {
    let engine = Arc::new(ScriptedEngine::new());
    engine.status("/basketball/travel/", 503);
    engine.ok("https://travel.test", json!({"status": "ok"}));
    basketball_routes(&engine);
    let mut settings = test_settings();
    settings.orchestrator.max_attempts = 1;
    settings.health.reconnect_backoff_secs = 0;
    let pipeline = IntelligencePipeline::with_engine(settings, engine.clone()).unwrap();
    let mut manager = WorkerManager::new();
    pipeline.start_background(&mut manager).unwrap();

    pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g9")).with_factors(["travelDistance", "venue"]))
        .await
        .unwrap();

    let health = pipeline.health().clone();
    assert!(
        eventually(|| {
            health
                .get_health("travel")
                .map(|s| s.successful_requests == 1 && s.consecutive_failures == 0)
                .unwrap_or(false)
        })
        .await
    );
    let travel = health.get_health("travel").unwrap();
    assert_ne!(travel.status, SourceStatus::Unhealthy);
    assert_eq!(travel.total_requests, 2);

    pipeline.shutdown();
    manager.shutdown().await;
}

#[tokio::test]
async fn test_exhausted_source_recovers_on_periodic_check() {
    let engine = Arc::new(ScriptedEngine::new());
    engine.status("https://travel.test", 503);
    let mut settings = test_settings();
    settings.health.reconnect_attempts = 1;
    settings.health.reconnect_backoff_secs = 0;
    settings.health.probe_interval_secs = 1;
    let pipeline = IntelligencePipeline::with_engine(settings, engine.clone()).unwrap();
    let mut manager = WorkerManager::new();
    pipeline.start_background(&mut manager).unwrap();

    let health = pipeline.health().clone();
    for _ in 0..5 {
        health
            .record_request("travel", false, 50, Some("connection reset"))
            .unwrap();
    }
    assert!(
        eventually(|| {
            health
                .get_health("travel")
                .map(|s| s.total_requests == 6)
                .unwrap_or(false)
        })
        .await
    );
    assert_eq!(health.unhealthy_sources(), vec!["travel".to_string()]);

    engine
        .forget("https://travel.test")
        .ok("https://travel.test", json!({"status": "ok"}));

    let mut recovered = false;
    for _ in 0..100 {
        if health.unhealthy_sources().is_empty() {
            recovered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(recovered, "source never left the unhealthy state");
    let travel = health.get_health("travel").unwrap();
    assert_eq!(travel.consecutive_failures, 0);
    assert!(travel.successful_requests >= 1);
    assert!(engine.calls_matching("https://travel.test") >= 2);

    pipeline.shutdown();
    manager.shutdown().await;
}

#[tokio::test]
async fn test_window_roll_opens_fresh_slot() {
    let engine = Arc::new(ScriptedEngine::new());
    basketball_routes(&engine);
    let pipeline = IntelligencePipeline::with_engine(test_settings(), engine).unwrap();
    pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g1")).with_factors(["venue"]))
        .await
        .unwrap();

    let before = pipeline.health().performance_report("venues").unwrap().hourly.len();
    let rolled = pipeline
        .health()
        .roll_windows(Utc::now() + chrono::Duration::hours(1));
    assert!(rolled >= 1);
    let report = pipeline.health().performance_report("venues").unwrap();
    assert_eq!(report.hourly.len(), before + 1);
    assert_eq!(report.hourly.last().unwrap().requests, 0);
}
