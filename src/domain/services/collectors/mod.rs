// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 内置领域采集器
//!
//! 各领域共用的因子（场馆、裁判、旅行距离、伤病）换算规则放在这里，
//! 领域特有的因子在各自模块中实现

mod basketball;
mod football;
mod soccer;

pub use basketball::BasketballCollector;
pub use football::FootballCollector;
pub use soccer::SoccerCollector;

use serde_json::Value;

use crate::domain::models::factor::FactorImpact;
use crate::domain::models::job::EntityRef;

pub(crate) fn num(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

pub(crate) fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// 主队胜率增量 `delta`，客队取相反数
pub(crate) fn swing(impact: FactorImpact, delta: f64) -> FactorImpact {
    impact.with_outcome("home", delta).with_outcome("away", -delta)
}

/// 中立场地没有主场优势
pub(crate) fn is_neutral_site(entity: &EntityRef) -> bool {
    matches!(entity.get("neutral_site"), Some("true") | Some("1"))
}

/// 场馆：历史主场胜率相对领域基准的偏差，高海拔额外加成
pub(crate) fn venue_impact(value: &Value, entity: &EntityRef, base_home: f64) -> FactorImpact {
    if is_neutral_site(entity) {
        return FactorImpact::neutral("neutral site");
    }
    let mut delta = num(value, "home_win_rate")
        .map(|rate| (rate - base_home).clamp(-0.25, 0.25))
        .unwrap_or(0.0);
    if num(value, "altitude_ft").is_some_and(|ft| ft >= 4_000.0) {
        delta += 0.05;
    }
    let name = value.get("name").and_then(Value::as_str).unwrap_or("venue");
    swing(FactorImpact::default(), delta)
        .with_summary(format!("{} home edge {:+.3}", name, delta))
}

/// 裁判：执法场次的主队胜率偏差与场均总分偏差
pub(crate) fn referee_impact(
    value: &Value,
    base_home: f64,
    magnitude: &str,
    base_total: f64,
) -> FactorImpact {
    let delta = num(value, "home_win_rate")
        .map(|rate| (rate - base_home).clamp(-0.15, 0.15))
        .unwrap_or(0.0);
    let mut impact = swing(FactorImpact::default(), delta);
    if let Some(avg) = num(value, "avg_total_score") {
        impact = impact.with_magnitude(magnitude, avg - base_total);
    }
    impact.with_summary(format!("officiating home bias {:+.3}", delta))
}

/// 旅行：客队比主队多走的里程与跨越时区
pub(crate) fn travel_impact(value: &Value) -> FactorImpact {
    let away = num(value, "away_travel_miles").unwrap_or(0.0);
    let home = num(value, "home_travel_miles").unwrap_or(0.0);
    let zones = num(value, "time_zones_crossed").unwrap_or(0.0);
    let delta = ((away - home) / 1_000.0 * 0.05 + zones * 0.02).clamp(-0.15, 0.15);
    swing(FactorImpact::default(), delta).with_summary(format!(
        "away travelled {:.0} mi across {} zones",
        away, zones
    ))
}

/// 伤病：双方伤病影响分之差，影响分越高得分越少
pub(crate) fn injury_impact(value: &Value, magnitude: &str, points_per_unit: f64) -> FactorImpact {
    let home = num(value, "home_impact").unwrap_or(0.0);
    let away = num(value, "away_impact").unwrap_or(0.0);
    let delta = ((away - home) * 0.04).clamp(-0.3, 0.3);
    swing(FactorImpact::default(), delta)
        .with_magnitude(magnitude, -(home + away) * points_per_unit)
        .with_summary(format!("injury impact home {:.1} away {:.1}", home, away))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_venue_impact_respects_neutral_site() {
        let value = json!({"name": "Arena", "home_win_rate": 0.75});
        let home = venue_impact(&value, &EntityRef::new("g1"), 0.6);
        assert!((home.outcome("home") - 0.15).abs() < 1e-9);
        assert!((home.outcome("away") + 0.15).abs() < 1e-9);

        let neutral = venue_impact(
            &value,
            &EntityRef::new("g1").with("neutral_site", "true"),
            0.6,
        );
        assert_eq!(neutral.outcome("home"), 0.0);
    }

    #[test]
    fn test_travel_impact_is_bounded() {
        let impact = travel_impact(&json!({"away_travel_miles": 3400, "time_zones_crossed": 3}));
        assert_eq!(impact.outcome("home"), 0.15);
    }

    #[test]
    fn test_injury_impact_lowers_totals() {
        let impact = injury_impact(&json!({"home_impact": 6.0, "away_impact": 1.0}), "total_points", 1.0);
        assert!(impact.outcome("home") < 0.0);
        assert_eq!(impact.magnitudes["total_points"], -7.0);
    }
}
