// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::models::job::{EntityRef, JobPriority};

/// 预测请求
///
/// `factors` 为空表示采集该领域的全部因子
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CollectionRequest {
    #[validate(length(min = 1, max = 64))]
    pub domain: String,
    #[validate(custom(function = "validate_entity"))]
    pub entity: EntityRef,
    #[serde(default)]
    #[validate(length(max = 32))]
    pub factors: Vec<String>,
    /// 跳过预测缓存（因子缓存同样跳过）
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default)]
    pub priority: JobPriority,
}

impl CollectionRequest {
    pub fn new(domain: impl Into<String>, entity: EntityRef) -> Self {
        Self {
            domain: domain.into(),
            entity,
            factors: Vec::new(),
            force_refresh: false,
            priority: JobPriority::Normal,
        }
    }

    pub fn with_factors<I, S>(mut self, factors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.factors = factors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn refreshing(mut self) -> Self {
        self.force_refresh = true;
        self
    }
}

fn validate_entity(entity: &EntityRef) -> Result<(), ValidationError> {
    let id = entity.id.trim();
    if id.is_empty() || id.len() > 128 {
        return Err(ValidationError::new("entity_id_length"));
    }
    if entity.id.contains(['/', '?', '#', '|', '&']) {
        return Err(ValidationError::new("entity_id_charset"));
    }
    if entity.context.len() > 16 {
        return Err(ValidationError::new("entity_context_size"));
    }
    Ok(())
}
