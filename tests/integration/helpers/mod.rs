// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde_json::{json, Value};
use sportintel::config::settings::Settings;
use sportintel::domain::models::source::SourceDefinition;
use sportintel::engines::traits::{FetchEngine, FetchRequest, FetchResponse, TransportError};
use std::time::Duration;

pub const SOURCE_IDS: [&str; 6] = ["officials", "venues", "travel", "schedules", "injuries", "weather"];

struct Route {
    fragment: String,
    status: u16,
    body: String,
    delay: Duration,
}

/// 按 URL 片段路由的内存抓取引擎，未匹配的请求返回 404
#[derive(Default)]
pub struct ScriptedEngine {
    routes: parking_lot::Mutex<Vec<Route>>,
    calls: parking_lot::Mutex<Vec<FetchRequest>>,
}

#[allow(dead_code)]
impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(&self, fragment: &str, body: Value) -> &Self {
        self.respond(fragment, 200, body, Duration::ZERO)
    }

    pub fn status(&self, fragment: &str, status: u16) -> &Self {
        self.respond(fragment, status, json!({"error": "upstream"}), Duration::ZERO)
    }

    pub fn slow(&self, fragment: &str, body: Value, delay: Duration) -> &Self {
        self.respond(fragment, 200, body, delay)
    }

    fn respond(&self, fragment: &str, status: u16, body: Value, delay: Duration) -> &Self {
        self.routes.lock().push(Route {
            fragment: fragment.to_string(),
            status,
            body: body.to_string(),
            delay,
        });
        self
    }

    /// 移除包含该片段的路由
    pub fn forget(&self, fragment: &str) -> &Self {
        self.routes.lock().retain(|r| r.fragment != fragment);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|r| r.url.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_matching(&self, fragment: &str) -> usize {
        self.calls.lock().iter().filter(|r| r.url.contains(fragment)).count()
    }

    pub fn proxies_used(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .iter()
            .map(|r| r.proxy.as_ref().map(|p| p.url.clone()))
            .collect()
    }
}

#[async_trait]
impl FetchEngine for ScriptedEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        self.calls.lock().push(request.clone());
        let matched = self
            .routes
            .lock()
            .iter()
            .find(|r| request.url.contains(&r.fragment))
            .map(|r| (r.status, r.body.clone(), r.delay));
        let (status, body, delay) = matched.unwrap_or((404, "{}".to_string(), Duration::ZERO));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut response = FetchResponse::json(body);
        response.status_code = status;
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 所有数据源指向 `https://{id}.test` 且去掉等待时间的配置
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.sources = SOURCE_IDS
        .iter()
        .map(|id| SourceDefinition::new(*id, format!("https://{}.test", id), *id))
        .collect();
    settings.orchestrator.retry_backoff_ms = 1;
    settings.engine.politeness_delay_ms = 0;
    settings.alerts.log = false;
    settings
}

#[allow(dead_code)]
pub fn basketball_routes(engine: &ScriptedEngine) {
    engine
        .ok(
            "/basketball/referee/",
            json!({"name": "Scott Foster", "games_officiated": 1200, "home_win_rate": 0.58, "avg_total_score": 228.0}),
        )
        .ok(
            "/basketball/venue/",
            json!({"name": "TD Garden", "capacity": 19156, "home_win_rate": 0.66, "surface": "hardwood"}),
        )
        .ok(
            "/basketball/travel/",
            json!({"away_travel_miles": 2600, "home_travel_miles": 0, "time_zones_crossed": 3}),
        )
        .ok(
            "/basketball/back_to_back/",
            json!({"home_back_to_back": false, "away_back_to_back": true}),
        )
        .ok(
            "/basketball/injuries/",
            json!({"home_impact": 1.0, "away_impact": 3.5, "home_out": 1, "away_out": 2}),
        );
}

#[allow(dead_code)]
pub fn soccer_routes(engine: &ScriptedEngine) {
    engine
        .ok(
            "/soccer/venue/",
            json!({"name": "Anfield", "capacity": 61276, "home_win_rate": 0.64, "surface": "grass"}),
        )
        .ok(
            "/soccer/weather/",
            json!({"temperature": 48.0, "season": "winter", "wind_mph": 14.0, "precipitation_pct": 60.0}),
        )
        .ok(
            "/soccer/referee/",
            json!({"name": "Michael Oliver", "games_officiated": 420, "home_win_rate": 0.47}),
        )
        .ok(
            "/soccer/injuries/",
            json!({"home_impact": 2.5, "away_impact": 1.0, "home_out": 3, "away_out": 1}),
        )
        .ok(
            "/soccer/congestion/",
            json!({"home_matches_last_14": 4, "away_matches_last_14": 2, "cup_fixture": false}),
        )
        .ok(
            "/soccer/travel/",
            json!({"away_travel_miles": 180, "home_travel_miles": 0}),
        );
}

/// 轮询条件直到成立或超时
#[allow(dead_code)]
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
