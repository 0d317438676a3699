// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::models::factor::FactorRecord;
use crate::domain::models::job::EntityRef;
use crate::domain::models::prediction::PredictionBundle;

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 未单独配置的领域使用的 TTL
    pub default_ttl: Duration,
    /// 按领域覆盖的 TTL
    pub domain_ttls: HashMap<String, Duration>,
    /// 每类条目的最大数量
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut domain_ttls = HashMap::new();
        domain_ttls.insert("basketball".to_string(), Duration::from_secs(15 * 60));
        domain_ttls.insert("football".to_string(), Duration::from_secs(30 * 60));
        domain_ttls.insert("soccer".to_string(), Duration::from_secs(20 * 60));
        Self {
            default_ttl: Duration::from_secs(20 * 60),
            domain_ttls,
            max_entries: 10_000,
        }
    }
}

/// 缓存统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub factor_hits: u64,
    pub factor_misses: u64,
    pub bundles: usize,
    pub factors: usize,
}

#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> Cached<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) < self.ttl
    }
}

/// 预测结果缓存
///
/// 保存两类条目：按 (领域, 实体, 因子集合) 缓存的完整预测，
/// 以及按 (领域, 因子, 实体) 缓存的单个因子记录。
/// 过期条目在读取时惰性删除，也可由定时任务批量清理
pub struct PredictionCache {
    bundles: DashMap<String, Cached<PredictionBundle>>,
    factors: DashMap<String, Cached<FactorRecord>>,
    hits: AtomicU64,
    misses: AtomicU64,
    factor_hits: AtomicU64,
    factor_misses: AtomicU64,
    config: CacheConfig,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl PredictionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            bundles: DashMap::new(),
            factors: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            factor_hits: AtomicU64::new(0),
            factor_misses: AtomicU64::new(0),
            config,
        }
    }

    /// 领域对应的 TTL
    pub fn ttl_for(&self, domain: &str) -> Duration {
        self.config
            .domain_ttls
            .get(domain)
            .copied()
            .unwrap_or(self.config.default_ttl)
    }

    /// 完整预测的缓存键，因子集合排序去重后参与拼接
    pub fn bundle_key(domain: &str, entity: &EntityRef, factors: &[String]) -> String {
        let set: BTreeSet<&str> = factors.iter().map(String::as_str).collect();
        format!(
            "{}|{}|{}",
            domain,
            entity.cache_fragment(),
            set.into_iter().collect::<Vec<_>>().join(",")
        )
    }

    pub fn factor_key(domain: &str, factor: &str, entity: &EntityRef) -> String {
        format!("{}|{}|factor:{}", domain, entity.cache_fragment(), factor)
    }

    fn entity_prefix(domain: &str, entity: &EntityRef) -> String {
        format!("{}|{}|", domain, entity.cache_fragment())
    }

    /// 读取完整预测
    pub fn get_bundle(
        &self,
        domain: &str,
        entity: &EntityRef,
        factors: &[String],
    ) -> Option<PredictionBundle> {
        let key = Self::bundle_key(domain, entity, factors);
        match lookup(&self.bundles, &key) {
            Some(bundle) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("prediction_cache_requests_total", "kind" => "bundle", "result" => "hit")
                    .increment(1);
                debug!(key = %key, "Prediction cache hit");
                Some(bundle)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("prediction_cache_requests_total", "kind" => "bundle", "result" => "miss")
                    .increment(1);
                None
            }
        }
    }

    /// 写入完整预测，TTL 取自预测本身
    pub fn put_bundle(&self, factors: &[String], bundle: PredictionBundle) {
        let key = Self::bundle_key(&bundle.domain, &bundle.entity, factors);
        let ttl = Duration::from_secs(bundle.ttl_seconds);
        make_room(&self.bundles, self.config.max_entries);
        self.bundles.insert(key, Cached::new(bundle, ttl));
        gauge!("prediction_cache_entries", "kind" => "bundle").set(self.bundles.len() as f64);
    }

    /// 读取单个因子记录
    pub fn get_factor(&self, domain: &str, factor: &str, entity: &EntityRef) -> Option<FactorRecord> {
        let key = Self::factor_key(domain, factor, entity);
        match lookup(&self.factors, &key) {
            Some(record) => {
                self.factor_hits.fetch_add(1, Ordering::Relaxed);
                counter!("prediction_cache_requests_total", "kind" => "factor", "result" => "hit")
                    .increment(1);
                Some(record)
            }
            None => {
                self.factor_misses.fetch_add(1, Ordering::Relaxed);
                counter!("prediction_cache_requests_total", "kind" => "factor", "result" => "miss")
                    .increment(1);
                None
            }
        }
    }

    /// 写入单个因子记录
    pub fn put_factor(&self, entity: &EntityRef, record: FactorRecord) {
        let key = Self::factor_key(&record.domain, &record.factor, entity);
        let ttl = self.ttl_for(&record.domain);
        make_room(&self.factors, self.config.max_entries);
        self.factors.insert(key, Cached::new(record, ttl));
        gauge!("prediction_cache_entries", "kind" => "factor").set(self.factors.len() as f64);
    }

    /// 删除某实体的全部缓存条目
    ///
    /// # 返回值
    ///
    /// 删除的条目数
    pub fn invalidate_entity(&self, domain: &str, entity: &EntityRef) -> usize {
        let prefix = Self::entity_prefix(domain, entity);
        let before = self.bundles.len() + self.factors.len();
        self.bundles.retain(|key, _| !key.starts_with(&prefix));
        self.factors.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - (self.bundles.len() + self.factors.len());
        debug!(domain, entity = %entity.id, removed, "Cache entries invalidated");
        removed
    }

    /// 清理全部过期条目
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.bundles.len() + self.factors.len();
        self.bundles.retain(|_, cached| cached.is_fresh(now));
        self.factors.retain(|_, cached| cached.is_fresh(now));
        before - (self.bundles.len() + self.factors.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            factor_hits: self.factor_hits.load(Ordering::Relaxed),
            factor_misses: self.factor_misses.load(Ordering::Relaxed),
            bundles: self.bundles.len(),
            factors: self.factors.len(),
        }
    }
}

fn lookup<T: Clone>(map: &DashMap<String, Cached<T>>, key: &str) -> Option<T> {
    let now = Instant::now();
    if let Some(entry) = map.get(key) {
        if entry.is_fresh(now) {
            return Some(entry.value.clone());
        }
    }
    map.remove_if(key, |_, cached| !cached.is_fresh(now));
    None
}

/// 每次淘汰至少移除容量的十分之一，避免满载后每次写入都全表扫描
const EVICTION_BATCH_DIVISOR: usize = 10;

/// 达到上限时先清理过期条目，仍然满则一次淘汰最早写入的一批条目
fn make_room<T>(map: &DashMap<String, Cached<T>>, max_entries: usize) {
    if max_entries == 0 || map.len() < max_entries {
        return;
    }
    let now = Instant::now();
    map.retain(|_, cached| cached.is_fresh(now));
    let len = map.len();
    if len < max_entries {
        return;
    }

    let batch = (len + 1 - max_entries)
        .max(max_entries / EVICTION_BATCH_DIVISOR)
        .clamp(1, len);
    let mut entries: Vec<(Instant, String)> = map
        .iter()
        .map(|entry| (entry.value().inserted_at, entry.key().clone()))
        .collect();
    entries.select_nth_unstable(batch - 1);
    for (_, key) in entries.into_iter().take(batch) {
        map.remove(&key);
    }
    debug!(evicted = batch, "Cache capacity reached, oldest entries evicted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::factor::FactorImpact;
    use crate::domain::models::prediction::Predictions;
    use crate::domain::models::validation::DataQuality;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn bundle(domain: &str, entity: EntityRef, ttl_seconds: u64) -> PredictionBundle {
        PredictionBundle {
            domain: domain.to_string(),
            entity,
            factors: BTreeMap::new(),
            evaluation_order: vec![],
            failures: vec![],
            predictions: Predictions::default(),
            overall_confidence: 0.7,
            generated_at: Utc::now(),
            ttl_seconds,
        }
    }

    fn record(domain: &str, factor: &str) -> FactorRecord {
        FactorRecord {
            domain: domain.to_string(),
            factor: factor.to_string(),
            entity_id: "g1".to_string(),
            value: json!({"capacity": 19000}),
            impact: FactorImpact::neutral("n/a"),
            weight: 0.15,
            confidence: 0.9,
            quality: DataQuality::Good,
            source_id: "venues".to_string(),
            collected_at: Utc::now(),
        }
    }

    #[test]
    fn test_bundle_key_ignores_factor_order_and_duplicates() {
        let entity = EntityRef::new("g1").with("date", "2025-03-01");
        let a = PredictionCache::bundle_key(
            "basketball",
            &entity,
            &["venue".to_string(), "referee".to_string()],
        );
        let b = PredictionCache::bundle_key(
            "basketball",
            &entity,
            &["referee".to_string(), "venue".to_string(), "venue".to_string()],
        );
        assert_eq!(a, b);
        assert_eq!(a, "basketball|g1?date=2025-03-01|referee,venue");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bundle_expires_after_ttl() {
        let cache = PredictionCache::default();
        let entity = EntityRef::new("g1");
        let factors = vec!["venue".to_string()];
        cache.put_bundle(&factors, bundle("basketball", entity.clone(), 60));

        assert!(cache.get_bundle("basketball", &entity, &factors).is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get_bundle("basketball", &entity, &factors).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.bundles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_factor_ttl_follows_domain() {
        let cache = PredictionCache::default();
        let entity = EntityRef::new("g1");
        cache.put_factor(&entity, record("basketball", "venue"));
        cache.put_factor(&entity, record("football", "venue"));

        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        assert!(cache.get_factor("basketball", "venue", &entity).is_none());
        assert!(cache.get_factor("football", "venue", &entity).is_some());
        assert_eq!(cache.purge_expired(), 0);

        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        assert_eq!(cache.purge_expired(), 1);
    }

    #[test]
    fn test_invalidate_entity_only_touches_that_entity() {
        let cache = PredictionCache::default();
        let g1 = EntityRef::new("g1");
        let g2 = EntityRef::new("g2");
        let factors = vec!["venue".to_string()];
        cache.put_bundle(&factors, bundle("basketball", g1.clone(), 600));
        cache.put_bundle(&factors, bundle("basketball", g2.clone(), 600));
        cache.put_factor(&g1, record("basketball", "venue"));

        assert_eq!(cache.invalidate_entity("basketball", &g1), 2);
        assert!(cache.get_bundle("basketball", &g2, &factors).is_some());
        assert!(cache.get_factor("basketball", "venue", &g1).is_none());
    }

    #[test]
    fn test_separator_in_entity_id_does_not_collide() {
        let cache = PredictionCache::default();
        let plain = EntityRef::new("g1");
        let piped = EntityRef::new("g1|x");
        let embedded = EntityRef::new("g1?date=x");
        let with_context = EntityRef::new("g1").with("date", "x");
        let factors = vec!["venue".to_string()];
        cache.put_bundle(&factors, bundle("basketball", piped.clone(), 600));
        cache.put_bundle(&factors, bundle("basketball", embedded.clone(), 600));

        assert!(cache.get_bundle("basketball", &with_context, &factors).is_none());
        assert_eq!(cache.invalidate_entity("basketball", &plain), 0);
        assert!(cache.get_bundle("basketball", &piped, &factors).is_some());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = PredictionCache::new(CacheConfig {
            max_entries: 2,
            ..Default::default()
        });
        let factors = vec!["venue".to_string()];
        for id in ["a", "b", "c"] {
            cache.put_bundle(&factors, bundle("soccer", EntityRef::new(id), 600));
        }
        assert_eq!(cache.stats().bundles, 2);
        assert!(cache
            .get_bundle("soccer", &EntityRef::new("c"), &factors)
            .is_some());
    }

    #[test]
    fn test_capacity_evicts_in_batches() {
        let cache = PredictionCache::new(CacheConfig {
            max_entries: 20,
            ..Default::default()
        });
        let factors = vec!["venue".to_string()];
        let put = |i: usize| {
            cache.put_bundle(
                &factors,
                bundle("soccer", EntityRef::new(format!("e{:02}", i)), 600),
            )
        };
        for i in 0..21 {
            put(i);
        }
        // 一次淘汰两条，下一次写入无需再淘汰
        assert_eq!(cache.stats().bundles, 19);
        for gone in [0, 1] {
            let entity = EntityRef::new(format!("e{:02}", gone));
            assert!(cache.get_bundle("soccer", &entity, &factors).is_none());
        }
        put(21);
        assert_eq!(cache.stats().bundles, 20);
        assert!(cache
            .get_bundle("soccer", &EntityRef::new("e02"), &factors)
            .is_some());
    }
}
