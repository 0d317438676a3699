// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;

use super::{flag, injury_impact, is_neutral_site, num, referee_impact, swing, travel_impact, venue_impact};
use crate::domain::models::factor::FactorImpact;
use crate::domain::models::job::EntityRef;
use crate::domain::services::factor_collector::{BaseEstimate, FactorCollector, FactorSpec};

const BASE_HOME: f64 = 0.46;
const BASE_DRAW: f64 = 0.27;
const BASE_TOTAL_GOALS: f64 = 2.6;

const FACTORS: [FactorSpec; 6] = [
    FactorSpec::new("venue", 0.20, "venues", "venue"),
    FactorSpec::new("weather", 0.10, "weather", "weather"),
    FactorSpec::new("referee", 0.10, "officials", "referee"),
    FactorSpec::new("injuries", 0.30, "injuries", "injuries"),
    FactorSpec::new("fixtureCongestion", 0.20, "schedules", "congestion"),
    FactorSpec::new("travelDistance", 0.10, "travel", "travel"),
];

/// 足球采集器，三种结果：主胜、平局、客胜
#[derive(Debug, Default, Clone, Copy)]
pub struct SoccerCollector;

impl FactorCollector for SoccerCollector {
    fn domain(&self) -> &'static str {
        "soccer"
    }

    fn factors(&self) -> &[FactorSpec] {
        &FACTORS
    }

    fn outcomes(&self) -> &[&'static str] {
        &["home", "draw", "away"]
    }

    fn base_estimate(&self, entity: &EntityRef) -> BaseEstimate {
        let (home, away) = if is_neutral_site(entity) {
            let side = (1.0 - BASE_DRAW) / 2.0;
            (side, side)
        } else {
            (BASE_HOME, 1.0 - BASE_HOME - BASE_DRAW)
        };
        BaseEstimate::default()
            .with_outcome("home", home)
            .with_outcome("draw", BASE_DRAW)
            .with_outcome("away", away)
            .with_magnitude("total_goals", BASE_TOTAL_GOALS)
    }

    fn assess(&self, factor: &str, value: &Value, entity: &EntityRef) -> FactorImpact {
        match factor {
            "venue" => venue_impact(value, entity, BASE_HOME),
            "weather" => weather_impact(value),
            "referee" => {
                // 裁判数据的场均总分按进球计
                referee_impact(value, BASE_HOME, "total_goals", BASE_TOTAL_GOALS)
            }
            "injuries" => injury_impact(value, "total_goals", 0.05),
            "fixtureCongestion" => congestion_impact(value),
            "travelDistance" => travel_impact(value),
            _ => FactorImpact::neutral(format!("no rule for {}", factor)),
        }
    }

    fn model_confidence(&self) -> f64 {
        0.64
    }
}

/// 恶劣天气让比赛更胶着：平局概率上升、进球减少
fn weather_impact(value: &Value) -> FactorImpact {
    let heavy_rain = num(value, "precipitation_pct").is_some_and(|p| p > 60.0);
    let strong_wind = num(value, "wind_mph").is_some_and(|w| w > 25.0);
    if !heavy_rain && !strong_wind {
        return FactorImpact::neutral("playable conditions");
    }
    let mut impact = FactorImpact::default();
    if heavy_rain {
        impact = impact
            .with_outcome("draw", 0.10)
            .with_magnitude("total_goals", -0.3);
    }
    if strong_wind {
        impact = impact
            .with_outcome("draw", 0.05)
            .with_magnitude("total_goals", -0.2);
    }
    impact.with_summary(format!(
        "adverse weather rain={} wind={}",
        heavy_rain, strong_wind
    ))
}

/// 两周内比赛更多的一方处于劣势；杯赛周末进球略多
fn congestion_impact(value: &Value) -> FactorImpact {
    let home = num(value, "home_matches_last_14").unwrap_or(0.0);
    let away = num(value, "away_matches_last_14").unwrap_or(0.0);
    let delta = ((away - home) * 0.04).clamp(-0.2, 0.2);
    let mut impact = swing(FactorImpact::default(), delta);
    if flag(value, "cup_fixture") {
        impact = impact.with_magnitude("total_goals", 0.1);
    }
    impact.with_summary(format!("matches in 14 days home {} away {}", home, away))
}
