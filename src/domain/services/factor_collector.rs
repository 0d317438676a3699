// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::models::factor::FactorImpact;
use crate::domain::models::job::EntityRef;
use crate::domain::services::collectors::{
    BasketballCollector, FootballCollector, SoccerCollector,
};

/// 因子定义
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorSpec {
    /// 因子名称，例如 `travelDistance`
    pub name: &'static str,
    /// 聚合权重，同一领域内总和为 1
    pub weight: f64,
    /// 提供该因子的数据源
    pub source_id: &'static str,
    /// 校验使用的记录类型
    pub record_type: &'static str,
}

impl FactorSpec {
    pub const fn new(
        name: &'static str,
        weight: f64,
        source_id: &'static str,
        record_type: &'static str,
    ) -> Self {
        Self {
            name,
            weight,
            source_id,
            record_type,
        }
    }
}

/// 领域基准预测
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseEstimate {
    pub win_probability: BTreeMap<String, f64>,
    pub magnitudes: BTreeMap<String, f64>,
}

impl BaseEstimate {
    pub fn with_outcome(mut self, outcome: &str, probability: f64) -> Self {
        self.win_probability.insert(outcome.to_string(), probability);
        self
    }

    pub fn with_magnitude(mut self, magnitude: &str, value: f64) -> Self {
        self.magnitudes.insert(magnitude.to_string(), value);
        self
    }
}

/// 领域因子采集器
///
/// 定义某个领域固定顺序的因子列表与权重、互斥结果集合、基准预测，
/// 以及把单个已校验因子记录换算为结果影响的规则。
/// 采集器本身不做网络请求，抓取由调度器完成
pub trait FactorCollector: Send + Sync {
    fn domain(&self) -> &'static str;

    /// 按评估顺序排列的因子
    fn factors(&self) -> &[FactorSpec];

    /// 互斥结果，例如 home/away 或 home/draw/away
    fn outcomes(&self) -> &[&'static str];

    fn base_estimate(&self, entity: &EntityRef) -> BaseEstimate;

    /// 把因子记录换算为影响（未加权）
    fn assess(&self, factor: &str, value: &Value, entity: &EntityRef) -> FactorImpact;

    /// 领域模型的静态置信度
    fn model_confidence(&self) -> f64;

    /// 因子记录在数据源上的相对路径
    ///
    /// 形如 `/{domain}/{record_type}/{entity}`，实体标识按路径段转义，
    /// 实体上下文按键排序后作为查询参数
    fn request_path(&self, spec: &FactorSpec, entity: &EntityRef) -> String {
        let mut path = format!(
            "/{}/{}/{}",
            self.domain(),
            spec.record_type,
            urlencoding::encode(&entity.id)
        );
        if !entity.context.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(entity.context.iter())
                .finish();
            path.push('?');
            path.push_str(&query);
        }
        path
    }

    fn factor(&self, name: &str) -> Option<&FactorSpec> {
        self.factors().iter().find(|spec| spec.name == name)
    }
}

/// 采集器注册错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Collector already registered for domain: {0}")]
    DuplicateDomain(String),

    #[error("Collector for {0} declares no factors")]
    EmptyFactors(String),

    #[error("Collector for {0} declares no outcomes")]
    EmptyOutcomes(String),

    #[error("Factor {factor} declared twice for {domain}")]
    DuplicateFactor { domain: String, factor: String },

    #[error("Factor {factor} for {domain} has negative weight {weight}")]
    NegativeWeight {
        domain: String,
        factor: String,
        weight: f64,
    },

    #[error("Weights for {domain} sum to {sum}, expected 1")]
    InvalidWeights { domain: String, sum: f64 },
}

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// 采集器注册表
#[derive(Default, Clone)]
pub struct CollectorRegistry {
    collectors: HashMap<String, Arc<dyn FactorCollector>>,
    order: Vec<String>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册篮球、橄榄球、足球三个内置采集器
    pub fn with_defaults() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register(Arc::new(BasketballCollector))?;
        registry.register(Arc::new(FootballCollector))?;
        registry.register(Arc::new(SoccerCollector))?;
        Ok(registry)
    }

    /// 注册采集器，校验因子名称唯一且权重和为 1
    pub fn register(&mut self, collector: Arc<dyn FactorCollector>) -> Result<(), RegistryError> {
        let domain = collector.domain().to_string();
        if self.collectors.contains_key(&domain) {
            return Err(RegistryError::DuplicateDomain(domain));
        }
        if collector.factors().is_empty() {
            return Err(RegistryError::EmptyFactors(domain));
        }
        if collector.outcomes().is_empty() {
            return Err(RegistryError::EmptyOutcomes(domain));
        }

        let mut seen = HashSet::new();
        let mut sum = 0.0;
        for spec in collector.factors() {
            if !seen.insert(spec.name) {
                return Err(RegistryError::DuplicateFactor {
                    domain,
                    factor: spec.name.to_string(),
                });
            }
            if spec.weight < 0.0 {
                return Err(RegistryError::NegativeWeight {
                    domain,
                    factor: spec.name.to_string(),
                    weight: spec.weight,
                });
            }
            sum += spec.weight;
        }
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(RegistryError::InvalidWeights { domain, sum });
        }

        self.order.push(domain.clone());
        self.collectors.insert(domain, collector);
        Ok(())
    }

    pub fn get(&self, domain: &str) -> Option<Arc<dyn FactorCollector>> {
        self.collectors.get(domain).cloned()
    }

    /// 按注册顺序返回领域
    pub fn domains(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}
