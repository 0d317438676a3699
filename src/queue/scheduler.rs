// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::job::{CollectionJob, JobPriority};
use crate::workers::orchestrator::ScrapingOrchestrator;

/// 周期性任务调度器
///
/// 按固定节奏把任务模板的新副本以低优先级提交给调度器，
/// 用于预热常用实体的因子缓存
pub struct JobScheduler {
    orchestrator: Arc<ScrapingOrchestrator>,
    schedules: DashMap<Uuid, JoinHandle<()>>,
}

impl JobScheduler {
    /// 创建新的任务调度器实例
    ///
    /// # 参数
    ///
    /// * `orchestrator` - 接收任务的抓取调度器
    pub fn new(orchestrator: Arc<ScrapingOrchestrator>) -> Self {
        Self {
            orchestrator,
            schedules: DashMap::new(),
        }
    }

    /// 注册周期性任务
    ///
    /// 第一次提交立即发生，之后每隔 `cadence` 提交一次。
    /// 同一实体的上一轮任务仍在途时，新提交会合并到已有任务
    ///
    /// # 返回值
    ///
    /// 计划标识，可用于取消
    pub fn schedule_recurring(&self, template: CollectionJob, cadence: Duration) -> Uuid {
        let schedule_id = Uuid::new_v4();
        let orchestrator = self.orchestrator.clone();
        let cadence = cadence.max(Duration::from_millis(1));

        info!(
            schedule_id = %schedule_id,
            domain = %template.domain,
            factor = %template.factor,
            entity = %template.entity.id,
            "Recurring collection scheduled every {:?}",
            cadence
        );

        let handle = tokio::spawn(async move {
            let mut ticker = interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let job = template.respawn().with_priority(JobPriority::Low);
                match orchestrator.enqueue_detached(job) {
                    Ok(job_id) => debug!(schedule_id = %schedule_id, job_id = %job_id, "Scheduled job submitted"),
                    Err(e) => warn!(schedule_id = %schedule_id, error = %e, "Scheduled job rejected"),
                }
            }
        });
        self.schedules.insert(schedule_id, handle);
        schedule_id
    }

    /// 取消周期性任务，已提交的任务不受影响
    pub fn unschedule(&self, schedule_id: Uuid) -> bool {
        match self.schedules.remove(&schedule_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    /// 取消全部周期性任务
    pub fn shutdown(&self) {
        let ids: Vec<Uuid> = self.schedules.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.unschedule(id);
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        for entry in self.schedules.iter() {
            entry.value().abort();
        }
    }
}
