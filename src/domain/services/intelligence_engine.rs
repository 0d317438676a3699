// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use metrics::{counter, histogram};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::application::dto::collection_request::CollectionRequest;
use crate::domain::models::factor::FactorRecord;
use crate::domain::models::job::{CollectionJob, EntityRef, JobError, JobOutcome, JobPriority};
use crate::domain::models::prediction::{FactorFailure, PredictionBundle, Predictions};
use crate::domain::services::factor_collector::{
    CollectorRegistry, FactorCollector, FactorSpec, RegistryError,
};
use crate::infrastructure::cache::PredictionCache;
use crate::workers::orchestrator::ScrapingOrchestrator;

/// 引擎配置
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 同一实体相邻两次抓取之间的间隔
    pub politeness_delay: Duration,
    /// 模型静态置信度在总体置信度中的占比
    pub model_confidence_blend: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
    /// 校验失败的因子置信度上限
    pub failed_validation_cap: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            politeness_delay: Duration::from_millis(250),
            model_confidence_blend: 0.25,
            probability_floor: 0.02,
            probability_ceiling: 0.98,
            failed_validation_cap: 0.3,
        }
    }
}

/// 引擎错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntelligenceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Unknown factors for {domain}: {factors:?}")]
    UnknownFactors { domain: String, factors: Vec<String> },

    #[error("All {count} requested factors failed")]
    AllFactorsFailed {
        count: usize,
        failures: Vec<FactorFailure>,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// 情报引擎
///
/// 按领域采集器声明的顺序逐个采集因子，经调度器抓取和校验后
/// 按权重聚合为预测，并缓存完整结果与单个因子
pub struct IntelligenceEngine {
    collectors: parking_lot::RwLock<CollectorRegistry>,
    orchestrator: Arc<ScrapingOrchestrator>,
    cache: Arc<PredictionCache>,
    config: EngineConfig,
}

impl IntelligenceEngine {
    pub fn new(
        collectors: CollectorRegistry,
        orchestrator: Arc<ScrapingOrchestrator>,
        cache: Arc<PredictionCache>,
        config: EngineConfig,
    ) -> Self {
        info!(domains = ?collectors.domains(), "Intelligence engine initialized");
        Self {
            collectors: parking_lot::RwLock::new(collectors),
            orchestrator,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<PredictionCache> {
        &self.cache
    }

    pub fn domains(&self) -> Vec<String> {
        self.collectors.read().domains()
    }

    /// 注册新的领域采集器
    pub fn register_collector(
        &self,
        collector: Arc<dyn FactorCollector>,
    ) -> Result<(), IntelligenceError> {
        let domain = collector.domain();
        self.collectors.write().register(collector)?;
        info!(domain, "Collector registered");
        Ok(())
    }

    fn collector(&self, domain: &str) -> Result<Arc<dyn FactorCollector>, IntelligenceError> {
        self.collectors
            .read()
            .get(domain)
            .ok_or_else(|| IntelligenceError::UnknownDomain(domain.to_string()))
    }

    /// 处理预测请求
    ///
    /// 命中预测缓存时不产生任何抓取；否则按声明顺序逐个采集，
    /// 部分因子失败只降低置信度，全部失败时返回聚合错误
    ///
    /// # 参数
    ///
    /// * `request` - 预测请求
    ///
    /// # 返回值
    ///
    /// 预测结果或错误
    #[instrument(skip(self, request), fields(domain = %request.domain, entity = %request.entity.id))]
    pub async fn process(
        &self,
        request: &CollectionRequest,
    ) -> Result<PredictionBundle, IntelligenceError> {
        request
            .validate()
            .map_err(|e| IntelligenceError::InvalidRequest(e.to_string()))?;
        let collector = self.collector(&request.domain)?;
        let specs = resolve_factors(collector.as_ref(), &request.factors)?;
        let requested: Vec<String> = specs.iter().map(|s| s.name.to_string()).collect();

        if !request.force_refresh {
            if let Some(bundle) = self
                .cache
                .get_bundle(&request.domain, &request.entity, &requested)
            {
                counter!("intelligence_requests_total", "domain" => request.domain.clone(), "result" => "cached")
                    .increment(1);
                return Ok(bundle);
            }
        }

        let mut records = BTreeMap::new();
        let mut failures = Vec::new();
        let mut fetched_any = false;

        for spec in &specs {
            if !request.force_refresh {
                if let Some(record) =
                    self.cache
                        .get_factor(&request.domain, spec.name, &request.entity)
                {
                    debug!(factor = spec.name, "Factor served from cache");
                    records.insert(spec.name.to_string(), record);
                    continue;
                }
            }

            if fetched_any && !self.config.politeness_delay.is_zero() {
                tokio::time::sleep(self.config.politeness_delay).await;
            }
            fetched_any = true;

            match self.collect_factor(collector.as_ref(), spec, request).await {
                Ok(record) => {
                    self.cache.put_factor(&request.entity, record.clone());
                    records.insert(spec.name.to_string(), record);
                }
                Err(e) => {
                    warn!(factor = spec.name, error = %e, "Factor collection failed");
                    failures.push(FactorFailure {
                        factor: spec.name.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if records.is_empty() {
            counter!("intelligence_requests_total", "domain" => request.domain.clone(), "result" => "failed")
                .increment(1);
            return Err(IntelligenceError::AllFactorsFailed {
                count: specs.len(),
                failures,
            });
        }

        let bundle = self.aggregate(collector.as_ref(), &request.entity, &specs, records, failures);
        self.cache.put_bundle(&requested, bundle.clone());

        counter!("intelligence_requests_total", "domain" => request.domain.clone(), "result" => "collected")
            .increment(1);
        histogram!("intelligence_overall_confidence", "domain" => request.domain.clone())
            .record(bundle.overall_confidence);
        info!(
            factors = bundle.evaluation_order.len(),
            failed = bundle.failures.len(),
            confidence = bundle.overall_confidence,
            favorite = ?bundle.predictions.favorite,
            "Prediction bundle generated"
        );
        Ok(bundle)
    }

    /// 忽略缓存重新采集
    pub async fn refresh(
        &self,
        request: &CollectionRequest,
    ) -> Result<PredictionBundle, IntelligenceError> {
        let request = request.clone().refreshing();
        self.process(&request).await
    }

    /// 删除某实体的全部缓存
    pub fn invalidate(&self, domain: &str, entity: &EntityRef) -> usize {
        self.cache.invalidate_entity(domain, entity)
    }

    async fn collect_factor(
        &self,
        collector: &dyn FactorCollector,
        spec: &FactorSpec,
        request: &CollectionRequest,
    ) -> Result<FactorRecord, JobError> {
        let job = CollectionJob::new(
            collector.domain(),
            spec.name,
            spec.record_type,
            request.entity.clone(),
            spec.source_id,
            collector.request_path(spec, &request.entity),
        )
        .with_priority(request.priority);
        let outcome = self.orchestrator.submit(job).await?;
        Ok(self.factor_record(collector, spec, &request.entity, &outcome))
    }

    /// 把抓取结果转换为因子记录；校验失败的记录保留数据但压低置信度
    fn factor_record(
        &self,
        collector: &dyn FactorCollector,
        spec: &FactorSpec,
        entity: &EntityRef,
        outcome: &JobOutcome,
    ) -> FactorRecord {
        let validation = &outcome.validation;
        let confidence = if validation.is_valid() {
            validation.confidence
        } else {
            validation.confidence.min(self.config.failed_validation_cap)
        };
        FactorRecord {
            domain: collector.domain().to_string(),
            factor: spec.name.to_string(),
            entity_id: entity.id.clone(),
            value: outcome.payload.clone(),
            impact: collector.assess(spec.name, &outcome.payload, entity),
            weight: spec.weight,
            confidence,
            quality: validation.quality,
            source_id: outcome.source_id.clone(),
            collected_at: Utc::now(),
        }
    }

    /// 聚合因子为预测
    ///
    /// 结果概率从基准出发加上 Σ(影响 × 权重)，截断后在互斥结果间归一化；
    /// 总体置信度为所请求因子的加权置信度（失败因子计 0）与模型置信度的混合
    pub fn aggregate(
        &self,
        collector: &dyn FactorCollector,
        entity: &EntityRef,
        specs: &[FactorSpec],
        records: BTreeMap<String, FactorRecord>,
        failures: Vec<FactorFailure>,
    ) -> PredictionBundle {
        let base = collector.base_estimate(entity);
        let mut probabilities: BTreeMap<String, f64> = collector
            .outcomes()
            .iter()
            .map(|o| (o.to_string(), base.win_probability.get(*o).copied().unwrap_or(0.0)))
            .collect();
        let mut magnitudes = base.magnitudes.clone();

        let mut evaluation_order = Vec::new();
        let mut weighted_confidence = 0.0;
        let mut requested_weight = 0.0;

        for spec in specs {
            requested_weight += spec.weight;
            let Some(record) = records.get(spec.name) else {
                continue;
            };
            evaluation_order.push(spec.name.to_string());
            weighted_confidence += record.confidence * record.weight;

            for (outcome, delta) in &record.impact.outcomes {
                if let Some(p) = probabilities.get_mut(outcome) {
                    *p += delta * record.weight;
                }
            }
            for (magnitude, delta) in &record.impact.magnitudes {
                *magnitudes.entry(magnitude.clone()).or_insert(0.0) += delta * record.weight;
            }
        }

        for p in probabilities.values_mut() {
            *p = p.clamp(self.config.probability_floor, self.config.probability_ceiling);
        }
        let total: f64 = probabilities.values().sum();
        if total > 0.0 {
            for p in probabilities.values_mut() {
                *p /= total;
            }
        }
        for value in magnitudes.values_mut() {
            *value = value.max(0.0);
        }

        let mut favorite: Option<(&str, f64)> = None;
        for &outcome in collector.outcomes() {
            let p = probabilities.get(outcome).copied().unwrap_or(0.0);
            match favorite {
                Some((_, best)) if p <= best => {}
                _ => favorite = Some((outcome, p)),
            }
        }

        let factor_confidence = if requested_weight > 0.0 {
            weighted_confidence / requested_weight
        } else {
            0.0
        };
        let blend = self.config.model_confidence_blend.clamp(0.0, 1.0);
        let overall_confidence = (factor_confidence * (1.0 - blend)
            + collector.model_confidence() * blend)
            .clamp(0.0, 1.0);

        PredictionBundle {
            domain: collector.domain().to_string(),
            entity: entity.clone(),
            factors: records,
            evaluation_order,
            failures,
            predictions: Predictions {
                win_probability: probabilities,
                magnitudes,
                favorite: favorite.map(|(o, _)| o.to_string()),
            },
            overall_confidence,
            generated_at: Utc::now(),
            ttl_seconds: self.cache.ttl_for(collector.domain()).as_secs(),
        }
    }

    /// 构造预热任务模板，供周期调度使用
    pub fn warmup_template(
        &self,
        domain: &str,
        factor: &str,
        entity: EntityRef,
    ) -> Result<CollectionJob, IntelligenceError> {
        let collector = self.collector(domain)?;
        let spec = collector
            .factor(factor)
            .copied()
            .ok_or_else(|| IntelligenceError::UnknownFactors {
                domain: domain.to_string(),
                factors: vec![factor.to_string()],
            })?;
        let path = collector.request_path(&spec, &entity);
        Ok(CollectionJob::new(
            domain,
            spec.name,
            spec.record_type,
            entity,
            spec.source_id,
            path,
        )
        .with_priority(JobPriority::Low))
    }

    /// 监听调度器完成事件，把成功的因子写入因子缓存
    pub fn spawn_cache_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.orchestrator.subscribe();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Ok(outcome) = &event.outcome else {
                            continue;
                        };
                        let Ok(collector) = engine.collector(&event.job.domain) else {
                            continue;
                        };
                        let Some(spec) = collector.factor(&event.job.factor).copied() else {
                            continue;
                        };
                        let record =
                            engine.factor_record(collector.as_ref(), &spec, &event.job.entity, outcome);
                        engine.cache.put_factor(&event.job.entity, record);
                        debug!(job_id = %event.job.id, factor = %event.job.factor, "Factor cached from job event");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Cache listener lagged behind job events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// 把请求的因子过滤为声明顺序；空列表表示全部因子
fn resolve_factors(
    collector: &dyn FactorCollector,
    requested: &[String],
) -> Result<Vec<FactorSpec>, IntelligenceError> {
    if requested.is_empty() {
        return Ok(collector.factors().to_vec());
    }
    let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let unknown: Vec<String> = requested
        .iter()
        .filter(|name| collector.factor(name).is_none())
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(IntelligenceError::UnknownFactors {
            domain: collector.domain().to_string(),
            factors: unknown,
        });
    }
    Ok(collector
        .factors()
        .iter()
        .filter(|spec| wanted.contains(spec.name))
        .copied()
        .collect())
}

#[cfg(test)]
#[path = "intelligence_engine_test.rs"]
mod tests;
