// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use crate::infrastructure::alerts::AlertError;
use chrono::TimeZone;
use rand::Rng;

#[derive(Default)]
struct RecordingSink {
    alerts: parking_lot::Mutex<Vec<Alert>>,
}

impl RecordingSink {
    fn count(&self, kind: AlertType, severity: AlertSeverity) -> usize {
        self.alerts
            .lock()
            .iter()
            .filter(|a| a.alert_type == kind && a.severity == severity)
            .count()
    }
}

impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

struct PanickingSink;

impl AlertSink for PanickingSink {
    fn name(&self) -> &str {
        "panicking"
    }

    fn notify(&self, _alert: &Alert) -> Result<(), AlertError> {
        panic!("sink exploded");
    }
}

fn monitor() -> SourceHealthMonitor {
    SourceHealthMonitor::with_sources(
        HealthMonitorConfig::default(),
        vec![
            SourceDefinition::new("venues", "https://venues.test/api", "venue"),
            SourceDefinition::new("weather", "https://weather.test/api", "weather"),
        ],
    )
    .unwrap()
}

#[test]
fn test_source_without_requests_is_unknown_with_full_score() {
    let monitor = monitor();
    let source = monitor.get_health("venues").unwrap();
    assert_eq!(source.health_score, 100.0);
    assert_eq!(source.status, SourceStatus::Unknown);
    assert_eq!(source.total_requests, 0);
    assert!(source.active);
}

#[test]
fn test_unknown_source_is_rejected() {
    let monitor = monitor();
    assert_eq!(
        monitor.record_request("nope", true, 10, None).unwrap_err(),
        HealthError::UnknownSource("nope".to_string())
    );
    assert!(monitor.get_health("nope").is_err());
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let monitor = monitor();
    let result = monitor.register_source(SourceDefinition::new("venues", "https://x", "venue"));
    assert!(matches!(result, Err(HealthError::DuplicateSource(_))));
}

#[test]
fn test_health_score_and_reliability_stay_in_bounds() {
    let monitor = monitor();
    let mut rng = rand::rng();
    for _ in 0..500 {
        let success = rng.random_bool(0.6);
        let latency = rng.random_range(0..30_000u64);
        let source = monitor.record_request("weather", success, latency, None).unwrap();
        assert!((0.0..=100.0).contains(&source.health_score));
        assert!((0.0..=1.0).contains(&source.reliability));
    }
}

#[test]
fn test_successful_fast_requests_are_healthy() {
    let monitor = monitor();
    for _ in 0..5 {
        monitor.record_request("venues", true, 100, None).unwrap();
    }
    let source = monitor.get_health("venues").unwrap();
    assert_eq!(source.status, SourceStatus::Healthy);
    assert_eq!(source.reliability, 1.0);
    assert!(source.health_score > 95.0);
}

#[test]
fn test_critical_failure_alert_fires_once_per_unhealthy_episode() {
    let monitor = monitor();
    let sink = Arc::new(RecordingSink::default());
    monitor.register_alert_sink(sink.clone());

    for _ in 0..12 {
        monitor.record_request("venues", false, 100, Some("503")).unwrap();
    }
    assert_eq!(sink.count(AlertType::ConsecutiveFailures, AlertSeverity::Critical), 1);
    assert_eq!(sink.count(AlertType::ConsecutiveFailures, AlertSeverity::Warning), 1);
    assert_eq!(monitor.get_health("venues").unwrap().status, SourceStatus::Unhealthy);

    for _ in 0..20 {
        monitor.record_request("venues", true, 100, None).unwrap();
    }
    assert_eq!(monitor.get_health("venues").unwrap().status, SourceStatus::Healthy);

    for _ in 0..5 {
        monitor.record_request("venues", false, 100, Some("503")).unwrap();
    }
    assert_eq!(sink.count(AlertType::ConsecutiveFailures, AlertSeverity::Critical), 2);
}

#[test]
fn test_panicking_sink_does_not_block_others() {
    let monitor = monitor();
    let sink = Arc::new(RecordingSink::default());
    monitor.register_alert_sink(Arc::new(PanickingSink));
    monitor.register_alert_sink(sink.clone());

    for _ in 0..5 {
        monitor.record_request("venues", false, 100, Some("timeout")).unwrap();
    }
    assert_eq!(sink.count(AlertType::ConsecutiveFailures, AlertSeverity::Critical), 1);
    assert_eq!(monitor.get_health("venues").unwrap().consecutive_failures, 5);
}

#[test]
fn test_slow_responses_degrade_and_alert() {
    let monitor = monitor();
    let sink = Arc::new(RecordingSink::default());
    monitor.register_alert_sink(sink.clone());

    let source = monitor.record_request("weather", true, 6_000, None).unwrap();
    assert_eq!(source.status, SourceStatus::Degraded);
    assert_eq!(sink.count(AlertType::ResponseTime, AlertSeverity::Warning), 1);
    assert_eq!(sink.count(AlertType::ResponseTime, AlertSeverity::Critical), 0);
}

#[tokio::test]
async fn test_unhealthy_transition_is_published_once() {
    let monitor = monitor();
    let mut rx = monitor.subscribe_unhealthy();

    for _ in 0..8 {
        monitor.record_request("weather", false, 50, Some("refused")).unwrap();
    }
    assert_eq!(rx.try_recv().unwrap(), "weather");
    assert!(rx.try_recv().is_err());
    assert_eq!(monitor.unhealthy_sources(), vec!["weather".to_string()]);
}

#[test]
fn test_windows_roll_and_discard_oldest() {
    let monitor = monitor();
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 15, 0).unwrap();
    for hour in 0..30 {
        let now = start + ChronoDuration::hours(hour);
        monitor
            .record_request_at("venues", true, 100, None, now)
            .unwrap();
    }
    let report = monitor.performance_report("venues").unwrap();
    assert_eq!(report.hourly.len(), 24);
    assert_eq!(report.daily.len(), 2);
    assert_eq!(
        report.hourly[0].started_at,
        Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap()
    );
    assert!(report.hourly.iter().all(|slot| slot.requests == 1));
}

#[test]
fn test_roll_windows_opens_empty_slot() {
    let monitor = SourceHealthMonitor::with_sources(
        HealthMonitorConfig::default(),
        vec![SourceDefinition::new("venues", "https://venues.test/api", "venue")],
    )
    .unwrap();
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 5, 0).unwrap();
    monitor.record_request_at("venues", true, 100, None, start).unwrap();

    assert_eq!(monitor.roll_windows(start), 0);
    assert_eq!(monitor.roll_windows(start + ChronoDuration::hours(1)), 1);

    let report = monitor.performance_report("venues").unwrap();
    assert_eq!(report.hourly.len(), 2);
    assert_eq!(report.hourly[1].requests, 0);
}

#[test]
fn test_trend_detects_decline() {
    let monitor = monitor();
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    for _ in 0..10 {
        monitor.record_request_at("venues", true, 100, None, start).unwrap();
    }
    let later = start + ChronoDuration::hours(1);
    for i in 0..10 {
        monitor
            .record_request_at("venues", i % 2 == 0, 100, None, later)
            .unwrap();
    }
    let report = monitor.performance_report("venues").unwrap();
    assert_eq!(report.trend, HealthTrend::Declining);
}

#[test]
fn test_deactivate_and_summary() {
    let monitor = monitor();
    monitor.record_request("venues", true, 100, None).unwrap();
    monitor.deactivate("weather").unwrap();
    assert!(!monitor.is_active("weather"));
    assert!(monitor.is_active("venues"));

    let summary = monitor.summary();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.healthy, 1);
    assert_eq!(summary.unknown, 1);
    assert_eq!(summary.inactive, 1);

    monitor.activate("weather").unwrap();
    assert!(monitor.is_active("weather"));
}

#[test]
fn test_compute_health_score_penalizes_failures() {
    let mut source = Source::from_definition(SourceDefinition::new("s", "https://s", "x"));
    source.total_requests = 10;
    source.successful_requests = 10;
    source.reliability = 1.0;
    source.avg_response_time_ms = 0.0;
    assert_eq!(compute_health_score(&source), 100.0);

    source.consecutive_failures = 10;
    assert_eq!(compute_health_score(&source), 50.0);
}
