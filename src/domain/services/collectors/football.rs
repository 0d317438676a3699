// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;

use super::{injury_impact, is_neutral_site, num, referee_impact, swing, travel_impact, venue_impact};
use crate::domain::models::factor::FactorImpact;
use crate::domain::models::job::EntityRef;
use crate::domain::services::factor_collector::{BaseEstimate, FactorCollector, FactorSpec};

const BASE_HOME: f64 = 0.57;
const BASE_TOTAL_POINTS: f64 = 44.0;

const FACTORS: [FactorSpec; 6] = [
    FactorSpec::new("weather", 0.15, "weather", "weather"),
    FactorSpec::new("venue", 0.15, "venues", "venue"),
    FactorSpec::new("referee", 0.10, "officials", "referee"),
    FactorSpec::new("travelDistance", 0.10, "travel", "travel"),
    FactorSpec::new("injuries", 0.30, "injuries", "injuries"),
    FactorSpec::new("restDays", 0.20, "schedules", "rest"),
];

/// 美式橄榄球采集器
#[derive(Debug, Default, Clone, Copy)]
pub struct FootballCollector;

impl FactorCollector for FootballCollector {
    fn domain(&self) -> &'static str {
        "football"
    }

    fn factors(&self) -> &[FactorSpec] {
        &FACTORS
    }

    fn outcomes(&self) -> &[&'static str] {
        &["home", "away"]
    }

    fn base_estimate(&self, entity: &EntityRef) -> BaseEstimate {
        let home = if is_neutral_site(entity) { 0.5 } else { BASE_HOME };
        BaseEstimate::default()
            .with_outcome("home", home)
            .with_outcome("away", 1.0 - home)
            .with_magnitude("total_points", BASE_TOTAL_POINTS)
    }

    fn assess(&self, factor: &str, value: &Value, entity: &EntityRef) -> FactorImpact {
        match factor {
            "weather" => weather_impact(value, entity),
            "venue" => venue_impact(value, entity, BASE_HOME),
            "referee" => referee_impact(value, BASE_HOME, "total_points", BASE_TOTAL_POINTS),
            "travelDistance" => travel_impact(value),
            "injuries" => injury_impact(value, "total_points", 0.6),
            "restDays" => rest_impact(value),
            _ => FactorImpact::neutral(format!("no rule for {}", factor)),
        }
    }

    fn model_confidence(&self) -> f64 {
        0.68
    }
}

/// 大风和降水压低总分；严寒对习惯主场气候的一方有利
fn weather_impact(value: &Value, entity: &EntityRef) -> FactorImpact {
    let mut impact = FactorImpact::default();
    let mut total = 0.0;

    if let Some(wind) = num(value, "wind_mph") {
        if wind > 15.0 {
            total -= (wind - 15.0) * 0.3;
        }
    }
    if num(value, "precipitation_pct").is_some_and(|p| p > 50.0) {
        total -= 3.0;
    }
    if let Some(temperature) = num(value, "temperature") {
        if temperature < 32.0 {
            total -= 2.0;
            if !is_neutral_site(entity) {
                impact = swing(impact, 0.05);
            }
        }
    }

    let conditions = value
        .get("conditions")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    impact
        .with_magnitude("total_points", total)
        .with_summary(format!("{} conditions, total {:+.1}", conditions, total))
}

fn rest_impact(value: &Value) -> FactorImpact {
    let home = num(value, "home_rest_days").unwrap_or(7.0);
    let away = num(value, "away_rest_days").unwrap_or(7.0);
    let delta = ((home - away) * 0.03).clamp(-0.15, 0.15);
    swing(FactorImpact::default(), delta)
        .with_summary(format!("rest days home {} away {}", home, away))
}
