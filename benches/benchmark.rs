// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 性能基准测试套件
//!
//! 覆盖请求热路径上的纯计算部分：记录校验、缓存键生成与缓存命中

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use sportintel::domain::models::factor::{FactorImpact, FactorRecord};
use sportintel::domain::models::job::EntityRef;
use sportintel::domain::models::validation::DataQuality;
use sportintel::domain::services::data_validator::DataValidator;
use sportintel::infrastructure::cache::PredictionCache;
use std::hint::black_box;

/// 基准测试：记录校验
///
/// 对比干净记录与带异常值的记录的校验开销
fn benchmark_validation(c: &mut Criterion) {
    let validator = DataValidator::default();
    let now = Utc::now();
    let clean = json!({
        "temperature": 78.0,
        "season": "summer",
        "wind_mph": 6.0,
        "timestamp": now.to_rfc3339(),
    });
    let anomalous = json!({
        "temperature": 12.0,
        "season": "summer",
        "wind_mph": 95.0,
        "timestamp": (now - chrono::Duration::hours(30)).to_rfc3339(),
    });

    let mut group = c.benchmark_group("validation");
    for (name, record) in [("clean", &clean), ("anomalous", &anomalous)] {
        group.bench_with_input(BenchmarkId::new("weather", name), record, |b, record| {
            b.iter(|| {
                black_box(validator.validate_at(
                    "football",
                    "weather",
                    black_box(record),
                    "weather",
                    now,
                ))
            });
        });
    }
    group.bench_function("venue", |b| {
        let venue = json!({"name": "TD Garden", "capacity": 19156, "home_win_rate": 0.66});
        b.iter(|| black_box(validator.validate_at("basketball", "venue", &venue, "venues", now)));
    });
    group.finish();
}

/// 基准测试：缓存键与命中
fn benchmark_cache(c: &mut Criterion) {
    let cache = PredictionCache::default();
    let entity = EntityRef::new("bos-lal").with("date", "2025-03-01");

    let mut group = c.benchmark_group("cache");
    for size in [1usize, 5, 10] {
        let factors: Vec<String> = (0..size).rev().map(|i| format!("factor-{}", i)).collect();
        group.bench_with_input(BenchmarkId::new("bundle_key", size), &factors, |b, factors| {
            b.iter(|| black_box(PredictionCache::bundle_key("basketball", &entity, factors)));
        });
    }

    cache.put_factor(
        &entity,
        FactorRecord {
            domain: "basketball".to_string(),
            factor: "venue".to_string(),
            entity_id: entity.id.clone(),
            value: json!({"name": "TD Garden"}),
            impact: FactorImpact::neutral("home court").with_outcome("home", 0.03),
            weight: 0.15,
            confidence: 0.95,
            quality: DataQuality::Excellent,
            source_id: "venues".to_string(),
            collected_at: Utc::now(),
        },
    );
    group.bench_function("factor_hit", |b| {
        b.iter(|| black_box(cache.get_factor("basketball", "venue", &entity)));
    });
    group.bench_function("factor_miss", |b| {
        b.iter(|| black_box(cache.get_factor("basketball", "referee", &entity)));
    });
    group.finish();
}

criterion_group!(benches, benchmark_validation, benchmark_cache);
criterion_main!(benches);
