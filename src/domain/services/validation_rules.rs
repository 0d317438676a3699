// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::models::validation::{Anomaly, IssueKind, ValidationIssue};

/// 字段期望的 JSON 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    /// 没有小数部分的数字
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map(|v| v.fract() == 0.0).unwrap_or(false)
            }
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

/// 单个字段的约束
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed: Option<Vec<String>>,
}

impl FieldRule {
    pub fn required(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: true,
            min: None,
            max: None,
            allowed: None,
        }
    }

    pub fn optional(name: &str, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// 业务规则：返回违反规则的错误
pub type BusinessRule = Arc<dyn Fn(&Map<String, Value>) -> Vec<ValidationIssue> + Send + Sync>;

/// 异常检测规则
pub type AnomalyRule = Arc<dyn Fn(&Map<String, Value>) -> Vec<Anomaly> + Send + Sync>;

/// 一个 (领域, 记录类型) 的全部规则
#[derive(Clone, Default)]
pub struct RuleSet {
    pub fields: Vec<FieldRule>,
    pub business_rules: Vec<BusinessRule>,
    pub anomaly_rules: Vec<AnomalyRule>,
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("fields", &self.fields)
            .field("business_rules", &self.business_rules.len())
            .field("anomaly_rules", &self.anomaly_rules.len())
            .finish()
    }
}

impl RuleSet {
    /// 所有规则集都声明可选的 `timestamp` 字段，用于计算新鲜度
    pub fn new() -> Self {
        Self::default().field(FieldRule::optional("timestamp", FieldType::String))
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    pub fn business<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Vec<ValidationIssue> + Send + Sync + 'static,
    {
        self.business_rules.push(Arc::new(rule));
        self
    }

    pub fn anomaly<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Vec<Anomaly> + Send + Sync + 'static,
    {
        self.anomaly_rules.push(Arc::new(rule));
        self
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// 规则注册表，按 (领域, 记录类型) 查找
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    sets: HashMap<(String, String), RuleSet>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 篮球、橄榄球、足球的内置规则
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for (domain, roster) in [("basketball", 15.0), ("football", 53.0), ("soccer", 25.0)] {
            let (min_capacity, max_capacity) = venue_capacity_band(domain);
            registry.register(domain, "venue", venue_rules(domain, min_capacity, max_capacity));
            registry.register(domain, "referee", referee_rules());
            registry.register(domain, "travel", travel_rules());
            registry.register(domain, "injuries", injury_rules(domain, roster));
        }
        registry.register("basketball", "back_to_back", back_to_back_rules());
        registry.register("football", "rest", rest_rules());
        registry.register("football", "weather", weather_rules());
        registry.register("soccer", "weather", weather_rules());
        registry.register("soccer", "congestion", congestion_rules());
        registry
    }

    pub fn register(&mut self, domain: &str, record_type: &str, rules: RuleSet) {
        self.sets
            .insert((domain.to_string(), record_type.to_string()), rules);
    }

    pub fn get(&self, domain: &str, record_type: &str) -> Option<&RuleSet> {
        self.sets.get(&(domain.to_string(), record_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// 各运动场馆容量合理区间
pub fn venue_capacity_band(domain: &str) -> (f64, f64) {
    match domain {
        "basketball" => (10_000.0, 25_000.0),
        "football" => (20_000.0, 110_000.0),
        "soccer" => (5_000.0, 100_000.0),
        _ => (0.0, 200_000.0),
    }
}

/// 华氏温度的季节合理区间
pub fn seasonal_temperature_band(season: &str) -> (f64, f64) {
    match season {
        "summer" => (50.0, 110.0),
        "winter" => (-20.0, 60.0),
        _ => (25.0, 90.0),
    }
}

pub const MAX_PLAUSIBLE_WIND_MPH: f64 = 45.0;
pub const MAX_PLAUSIBLE_TRAVEL_MILES: f64 = 3_500.0;
pub const MAX_COMBINED_REST_DAYS: f64 = 10.0;

fn number(record: &Map<String, Value>, field: &str) -> Option<f64> {
    record.get(field).and_then(Value::as_f64)
}

fn venue_rules(domain: &'static str, min_capacity: f64, max_capacity: f64) -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("name", FieldType::String))
        .field(FieldRule::required("capacity", FieldType::Integer).range(0.0, 200_000.0))
        .field(FieldRule::required("home_win_rate", FieldType::Number).range(0.0, 1.0))
        .field(
            FieldRule::optional("surface", FieldType::String)
                .one_of(&["hardwood", "grass", "turf", "hybrid"]),
        )
        .field(
            FieldRule::optional("roof", FieldType::String)
                .one_of(&["open", "closed", "retractable", "indoor"]),
        )
        .field(FieldRule::optional("altitude_ft", FieldType::Number).range(-500.0, 15_000.0))
        .business(move |record| {
            match number(record, "capacity") {
                Some(capacity) if capacity < min_capacity || capacity > max_capacity => {
                    vec![ValidationIssue::field(
                        "capacity",
                        IssueKind::BusinessRule,
                        format!(
                            "{} venue capacity {} outside [{}, {}]",
                            domain, capacity, min_capacity, max_capacity
                        ),
                    )]
                }
                _ => Vec::new(),
            }
        })
}

fn referee_rules() -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("name", FieldType::String))
        .field(FieldRule::required("games_officiated", FieldType::Integer).range(0.0, 3_000.0))
        .field(FieldRule::required("home_win_rate", FieldType::Number).range(0.0, 1.0))
        .field(FieldRule::optional("avg_total_score", FieldType::Number).range(0.0, 400.0))
        .field(FieldRule::optional("fouls_per_game", FieldType::Number).range(0.0, 100.0))
}

fn travel_rules() -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("away_travel_miles", FieldType::Number).range(0.0, 15_000.0))
        .field(FieldRule::optional("home_travel_miles", FieldType::Number).range(0.0, 15_000.0))
        .field(FieldRule::optional("time_zones_crossed", FieldType::Integer).range(0.0, 6.0))
        .anomaly(|record| {
            ["away_travel_miles", "home_travel_miles"]
                .iter()
                .filter_map(|field| {
                    let miles = number(record, field)?;
                    (miles > MAX_PLAUSIBLE_TRAVEL_MILES).then(|| {
                        Anomaly::outside_band("travel", field, miles, 0.0, MAX_PLAUSIBLE_TRAVEL_MILES)
                    })
                })
                .collect()
        })
}

fn back_to_back_rules() -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("home_back_to_back", FieldType::Boolean))
        .field(FieldRule::required("away_back_to_back", FieldType::Boolean))
        .field(FieldRule::optional("home_games_last_7", FieldType::Integer).range(0.0, 7.0))
        .field(FieldRule::optional("away_games_last_7", FieldType::Integer).range(0.0, 7.0))
}

fn rest_rules() -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("home_rest_days", FieldType::Integer).range(0.0, 60.0))
        .field(FieldRule::required("away_rest_days", FieldType::Integer).range(0.0, 60.0))
        .business(|record| {
            match (number(record, "home_rest_days"), number(record, "away_rest_days")) {
                (Some(home), Some(away))
                    if home > MAX_COMBINED_REST_DAYS && away > MAX_COMBINED_REST_DAYS =>
                {
                    vec![ValidationIssue::new(
                        None,
                        IssueKind::BusinessRule,
                        format!(
                            "both teams report more than {} rest days ({} / {})",
                            MAX_COMBINED_REST_DAYS, home, away
                        ),
                    )]
                }
                _ => Vec::new(),
            }
        })
}

fn injury_rules(domain: &'static str, roster: f64) -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("home_impact", FieldType::Number).range(0.0, 10.0))
        .field(FieldRule::required("away_impact", FieldType::Number).range(0.0, 10.0))
        .field(FieldRule::optional("home_out", FieldType::Integer).range(0.0, 60.0))
        .field(FieldRule::optional("away_out", FieldType::Integer).range(0.0, 60.0))
        .business(move |record| {
            ["home_out", "away_out"]
                .iter()
                .filter_map(|field| {
                    let out = number(record, field)?;
                    (out > roster).then(|| {
                        ValidationIssue::field(
                            field,
                            IssueKind::BusinessRule,
                            format!("{} players out exceeds {} roster size {}", out, domain, roster),
                        )
                    })
                })
                .collect()
        })
}

fn weather_rules() -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("temperature", FieldType::Number).range(-80.0, 160.0))
        .field(
            FieldRule::required("season", FieldType::String)
                .one_of(&["spring", "summer", "fall", "winter"]),
        )
        .field(FieldRule::optional("wind_mph", FieldType::Number).range(0.0, 150.0))
        .field(FieldRule::optional("precipitation_pct", FieldType::Number).range(0.0, 100.0))
        .field(FieldRule::optional("humidity", FieldType::Number).range(0.0, 100.0))
        .field(FieldRule::optional("conditions", FieldType::String))
        .anomaly(|record| {
            let mut anomalies = Vec::new();
            let season = record.get("season").and_then(Value::as_str).unwrap_or("spring");
            if let Some(temperature) = number(record, "temperature") {
                let (min, max) = seasonal_temperature_band(season);
                if temperature < min || temperature > max {
                    anomalies.push(Anomaly::outside_band(
                        "temperature",
                        "temperature",
                        temperature,
                        min,
                        max,
                    ));
                }
            }
            if let Some(wind) = number(record, "wind_mph") {
                if wind > MAX_PLAUSIBLE_WIND_MPH {
                    anomalies.push(Anomaly::outside_band(
                        "wind",
                        "wind_mph",
                        wind,
                        0.0,
                        MAX_PLAUSIBLE_WIND_MPH,
                    ));
                }
            }
            anomalies
        })
}

fn congestion_rules() -> RuleSet {
    RuleSet::new()
        .field(FieldRule::required("home_matches_last_14", FieldType::Integer).range(0.0, 10.0))
        .field(FieldRule::required("away_matches_last_14", FieldType::Integer).range(0.0, 10.0))
        .field(FieldRule::optional("cup_fixture", FieldType::Boolean))
}
