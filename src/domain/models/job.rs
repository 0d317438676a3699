// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::validation::ValidationResult;

/// 任务优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// 数值越小越先出队
    pub fn rank(&self) -> usize {
        match self {
            JobPriority::High => 0,
            JobPriority::Normal => 1,
            JobPriority::Low => 2,
        }
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Running => write!(f, "running"),
            JobState::Succeeded => write!(f, "succeeded"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// 预测目标实体，例如一场比赛
///
/// `context` 使用有序映射，保证缓存键和请求路径稳定
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// 用于缓存键的稳定片段
    ///
    /// 标识和上下文逐项转义，分隔符 `?`、`&`、`=`、`|` 不会出现在原始值中
    pub fn cache_fragment(&self) -> String {
        let id = urlencoding::encode(&self.id);
        if self.context.is_empty() {
            return id.into_owned();
        }
        let context = self
            .context
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", id, context)
    }
}

/// 去重键：同一 (领域, 因子, 实体) 同时最多只有一个在途任务
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub domain: String,
    pub factor: String,
    pub entity: String,
}

/// 数据采集任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionJob {
    pub id: Uuid,
    pub domain: String,
    pub factor: String,
    /// 校验规则使用的记录类型
    pub record_type: String,
    pub entity: EntityRef,
    pub source_id: String,
    /// 相对于数据源 base_url 的请求路径
    pub path: String,
    pub priority: JobPriority,
    pub state: JobState,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl CollectionJob {
    pub fn new(
        domain: impl Into<String>,
        factor: impl Into<String>,
        record_type: impl Into<String>,
        entity: EntityRef,
        source_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.into(),
            factor: factor.into(),
            record_type: record_type.into(),
            entity,
            source_id: source_id.into(),
            path: path.into(),
            priority: JobPriority::Normal,
            state: JobState::Queued,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            domain: self.domain.clone(),
            factor: self.factor.clone(),
            entity: self.entity.cache_fragment(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded | JobState::Failed)
    }

    /// 基于模板生成一个全新的任务实例（用于周期调度）
    pub fn respawn(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Queued,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            last_error: None,
            ..self.clone()
        }
    }
}

/// 任务成功结果
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub source_id: String,
    pub endpoint_id: String,
    pub payload: Value,
    pub validation: ValidationResult,
    pub attempts: u32,
    pub latency_ms: u64,
}

/// 任务失败原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("transport failed after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("source {0} is deactivated")]
    SourceInactive(String),

    #[error("job was cancelled")]
    Cancelled,

    #[error("orchestrator is shutting down")]
    Shutdown,
}

/// 任务完成事件，广播给缓存等订阅方
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job: CollectionJob,
    pub outcome: Result<JobOutcome, JobError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_fragment_is_order_independent() {
        let a = EntityRef::new("game-1").with("home", "LAL").with("away", "BOS");
        let b = EntityRef::new("game-1").with("away", "BOS").with("home", "LAL");
        assert_eq!(a.cache_fragment(), b.cache_fragment());
        assert_eq!(a.cache_fragment(), "game-1?away=BOS&home=LAL");
    }

    #[test]
    fn test_cache_fragment_escapes_separators() {
        let embedded = EntityRef::new("g1?date=x");
        let with_context = EntityRef::new("g1").with("date", "x");
        assert_ne!(embedded.cache_fragment(), with_context.cache_fragment());
        assert_eq!(embedded.cache_fragment(), "g1%3Fdate%3Dx");

        let piped = EntityRef::new("g1|x");
        assert!(!piped.cache_fragment().contains('|'));
        let tricky = EntityRef::new("g1").with("a", "1&b=2");
        assert_ne!(tricky.cache_fragment(), EntityRef::new("g1").with("a", "1").with("b", "2").cache_fragment());
    }

    #[test]
    fn test_respawn_resets_lifecycle() {
        let mut job = CollectionJob::new(
            "basketball",
            "venue",
            "venue",
            EntityRef::new("game-1"),
            "venues",
            "/basketball/venue/game-1",
        );
        job.state = JobState::Failed;
        job.attempts = 3;
        let fresh = job.respawn();
        assert_ne!(fresh.id, job.id);
        assert_eq!(fresh.state, JobState::Queued);
        assert_eq!(fresh.attempts, 0);
        assert_eq!(fresh.key(), job.key());
    }

    #[test]
    fn test_priority_rank_order() {
        assert!(JobPriority::High.rank() < JobPriority::Normal.rank());
        assert!(JobPriority::Normal.rank() < JobPriority::Low.rank());
    }
}
