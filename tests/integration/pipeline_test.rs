// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{basketball_routes, eventually, soccer_routes, test_settings, ScriptedEngine};
use serde_json::json;
use sportintel::application::dto::CollectionRequest;
use sportintel::application::pipeline::IntelligencePipeline;
use sportintel::config::settings::WarmupSettings;
use sportintel::domain::models::job::EntityRef;
use sportintel::domain::models::source::SourceStatus;
use sportintel::domain::services::intelligence_engine::IntelligenceError;
use sportintel::workers::manager::WorkerManager;
use sportintel::workers::webhook_worker::{ALERT_HEADER, SIGNATURE_HEADER};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline(engine: &Arc<ScriptedEngine>) -> IntelligencePipeline {
    IntelligencePipeline::with_engine(test_settings(), engine.clone()).unwrap()
}

#[tokio::test]
async fn test_basketball_bundle_end_to_end() {
    let engine = Arc::new(ScriptedEngine::new());
    basketball_routes(&engine);
    let pipeline = pipeline(&engine);

    let request = CollectionRequest::new("basketball", EntityRef::new("bos-lal").with("date", "2025-03-01"));
    let bundle = pipeline.process(&request).await.unwrap();

    assert_eq!(
        bundle.evaluation_order,
        vec!["referee", "venue", "travelDistance", "backToBackGames", "injuries"]
    );
    assert!(bundle.failures.is_empty());
    let home = bundle.win_probability("home").unwrap();
    let away = bundle.win_probability("away").unwrap();
    assert!((home + away - 1.0).abs() < 1e-9);
    assert!(home > away, "away team on a back-to-back should favour home, got {}", home);
    assert!(bundle.predictions.magnitudes.contains_key("total_points"));
    assert!(bundle.overall_confidence > 0.5 && bundle.overall_confidence <= 1.0);

    assert_eq!(engine.call_count(), 5);
    assert!(engine
        .calls()
        .iter()
        .all(|url| url.ends_with("/bos-lal?date=2025-03-01")));

    let venues = pipeline.health().get_health("venues").unwrap();
    assert_eq!(venues.status, SourceStatus::Healthy);
    assert_eq!(venues.total_requests, 1);
}

#[tokio::test]
async fn test_repeat_request_within_ttl_is_served_from_cache() {
    let engine = Arc::new(ScriptedEngine::new());
    basketball_routes(&engine);
    let pipeline = pipeline(&engine);
    let request = CollectionRequest::new("basketball", EntityRef::new("g1"))
        .with_factors(["injuries", "venue"]);

    let first = pipeline.process(&request).await.unwrap();
    let second = pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g1")).with_factors(["venue", "injuries"]))
        .await
        .unwrap();

    assert_eq!(engine.call_count(), 2);
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
    assert_eq!(first.ttl_seconds, 15 * 60);
}

#[tokio::test]
async fn test_soccer_outcomes_are_renormalized() {
    let engine = Arc::new(ScriptedEngine::new());
    soccer_routes(&engine);
    let pipeline = pipeline(&engine);

    let bundle = pipeline
        .process(&CollectionRequest::new("soccer", EntityRef::new("liv-ars")))
        .await
        .unwrap();

    let outcomes = &bundle.predictions.win_probability;
    assert_eq!(outcomes.len(), 3);
    let total: f64 = outcomes.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
    for p in outcomes.values() {
        assert!((0.02..=0.98).contains(p));
    }
    assert!(bundle.predictions.magnitudes.contains_key("total_goals"));
}

#[tokio::test]
async fn test_failing_source_degrades_without_failing_request() {
    let engine = Arc::new(ScriptedEngine::new());
    engine.status("/basketball/travel/", 503);
    basketball_routes(&engine);
    let mut settings = test_settings();
    settings.orchestrator.max_attempts = 2;
    let pipeline = IntelligencePipeline::with_engine(settings, engine.clone()).unwrap();

    let bundle = pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g2")))
        .await
        .unwrap();

    assert_eq!(bundle.failures.len(), 1);
    assert_eq!(bundle.failures[0].factor, "travelDistance");
    assert!(bundle.factor("travelDistance").is_none());
    assert_eq!(engine.calls_matching("/basketball/travel/"), 2);

    let travel = pipeline.health().get_health("travel").unwrap();
    assert_eq!(travel.consecutive_failures, 2);
    assert!(travel.health_score < 100.0);
}

#[tokio::test]
async fn test_unknown_factor_is_rejected_before_any_fetch() {
    let engine = Arc::new(ScriptedEngine::new());
    let pipeline = pipeline(&engine);

    let err = pipeline
        .process(&CollectionRequest::new("football", EntityRef::new("g1")).with_factors(["weather", "mascot"]))
        .await
        .unwrap_err();
    assert!(matches!(err, IntelligenceError::UnknownFactors { .. }));
    assert_eq!(engine.call_count(), 0);
    assert_eq!(pipeline.orchestrator().stats().enqueued_total, 0);
}

#[tokio::test]
async fn test_warmup_schedule_fills_factor_cache() {
    let engine = Arc::new(ScriptedEngine::new());
    basketball_routes(&engine);
    let mut settings = test_settings();
    settings.engine.warmup.push(WarmupSettings {
        domain: "basketball".to_string(),
        factor: "venue".to_string(),
        entity: EntityRef::new("g7"),
        cadence_secs: 3600,
    });
    let pipeline = IntelligencePipeline::with_engine(settings, engine.clone()).unwrap();
    let mut manager = WorkerManager::new();
    pipeline.start_background(&mut manager).unwrap();
    assert_eq!(pipeline.scheduler().len(), 1);

    let entity = EntityRef::new("g7");
    let cache = pipeline.engine().cache().clone();
    assert!(eventually(|| cache.get_factor("basketball", "venue", &entity).is_some()).await);

    let bundle = pipeline
        .process(&CollectionRequest::new("basketball", entity.clone()).with_factors(["venue"]))
        .await
        .unwrap();
    assert_eq!(bundle.evaluation_order, vec!["venue"]);
    assert_eq!(engine.calls_matching("/basketball/venue/g7"), 1);

    pipeline.shutdown();
    manager.shutdown().await;
    assert!(pipeline.scheduler().is_empty());
}

#[tokio::test]
async fn test_health_alerts_reach_signed_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/alerts"))
        .and(header_exists(SIGNATURE_HEADER))
        .and(header_exists(ALERT_HEADER))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let engine = Arc::new(ScriptedEngine::new());
    engine.status("/basketball/injuries/", 500);
    let mut settings = test_settings();
    settings.alerts.webhook_url = Some(format!("{}/hooks/alerts", server.uri()));
    settings.alerts.webhook_secret = Some("top-secret".to_string());
    settings.orchestrator.max_attempts = 3;
    let pipeline = IntelligencePipeline::with_engine(settings, engine.clone()).unwrap();
    let mut manager = WorkerManager::new();
    pipeline.start_background(&mut manager).unwrap();

    let err = pipeline
        .process(&CollectionRequest::new("basketball", EntityRef::new("g3")).with_factors(["injuries"]))
        .await
        .unwrap_err();
    assert!(matches!(err, IntelligenceError::AllFactorsFailed { count: 1, .. }));

    let mut delivered = false;
    for _ in 0..200 {
        let requests = server.received_requests().await.unwrap_or_default();
        let failure_alert = requests.iter().any(|r| {
            serde_json::from_slice::<serde_json::Value>(&r.body)
                .map(|alert| alert["alert_type"] == "consecutive_failures")
                .unwrap_or(false)
        });
        if failure_alert {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "no alert reached the webhook");

    pipeline.shutdown();
    manager.shutdown().await;
}

#[tokio::test]
async fn test_reqwest_engine_against_live_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/venues/basketball/venue/g5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Chase Center",
            "capacity": 18064,
            "home_win_rate": 0.63,
            "surface": "hardwood"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/officials/basketball/referee/g5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Tony Brothers",
            "games_officiated": 1500,
            "home_win_rate": 0.55
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = test_settings();
    for source in settings.sources.iter_mut() {
        source.base_url = format!("{}/{}", server.uri(), source.id);
    }
    let pipeline = IntelligencePipeline::from_settings(settings).unwrap();

    let request = CollectionRequest::new("basketball", EntityRef::new("g5")).with_factors(["venue", "referee"]);
    let bundle = pipeline.process(&request).await.unwrap();
    assert_eq!(bundle.evaluation_order, vec!["referee", "venue"]);
    assert_eq!(bundle.factor("venue").unwrap().value["name"], "Chase Center");

    pipeline.process(&request).await.unwrap();
}
