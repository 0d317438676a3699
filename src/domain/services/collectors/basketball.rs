// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;

use super::{flag, injury_impact, is_neutral_site, num, referee_impact, swing, travel_impact, venue_impact};
use crate::domain::models::factor::FactorImpact;
use crate::domain::models::job::EntityRef;
use crate::domain::services::factor_collector::{BaseEstimate, FactorCollector, FactorSpec};

const BASE_HOME: f64 = 0.60;
const BASE_TOTAL_POINTS: f64 = 224.0;
/// 背靠背一方的胜率损失
const BACK_TO_BACK_PENALTY: f64 = 0.30;
const BACK_TO_BACK_POINTS: f64 = 6.0;

const FACTORS: [FactorSpec; 5] = [
    FactorSpec::new("referee", 0.10, "officials", "referee"),
    FactorSpec::new("venue", 0.15, "venues", "venue"),
    FactorSpec::new("travelDistance", 0.15, "travel", "travel"),
    FactorSpec::new("backToBackGames", 0.30, "schedules", "back_to_back"),
    FactorSpec::new("injuries", 0.30, "injuries", "injuries"),
];

/// 篮球采集器
#[derive(Debug, Default, Clone, Copy)]
pub struct BasketballCollector;

impl FactorCollector for BasketballCollector {
    fn domain(&self) -> &'static str {
        "basketball"
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
            "referee" => referee_impact(value, BASE_HOME, "total_points", BASE_TOTAL_POINTS),
            "venue" => venue_impact(value, entity, BASE_HOME),
            "travelDistance" => travel_impact(value),
            "backToBackGames" => back_to_back_impact(value),
            "injuries" => injury_impact(value, "total_points", 1.5),
            _ => FactorImpact::neutral(format!("no rule for {}", factor)),
        }
    }

    fn model_confidence(&self) -> f64 {
        0.72
    }
}

fn back_to_back_impact(value: &Value) -> FactorImpact {
    let home_b2b = flag(value, "home_back_to_back");
    let away_b2b = flag(value, "away_back_to_back");

    let mut delta = 0.0;
    let mut total = 0.0;
    if home_b2b {
        delta -= BACK_TO_BACK_PENALTY;
        total -= BACK_TO_BACK_POINTS;
    }
    if away_b2b {
        delta += BACK_TO_BACK_PENALTY;
        total -= BACK_TO_BACK_POINTS;
    }
    // 近 7 天的赛程密度
    if let (Some(home), Some(away)) = (num(value, "home_games_last_7"), num(value, "away_games_last_7")) {
        delta += (away - home) * 0.02;
    }

    swing(FactorImpact::default(), delta)
        .with_magnitude("total_points", total)
        .with_summary(format!(
            "back-to-back home={} away={}",
            home_b2b, away_b2b
        ))
}
