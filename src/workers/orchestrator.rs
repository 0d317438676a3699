// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::job::{
    CollectionJob, JobError, JobEvent, JobKey, JobOutcome, JobState,
};
use crate::domain::services::data_validator::DataValidator;
use crate::domain::services::rate_limiting_service::RateLimitingService;
use crate::engines::health_monitor::SourceHealthMonitor;
use crate::engines::traits::FetchRequest;
use crate::engines::transport_manager::TransportManager;
use crate::queue::job_queue::JobQueue;
use crate::utils::retry_policy::RetryPolicy;

type Waiter = oneshot::Sender<Result<JobOutcome, JobError>>;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 同时执行的最大任务数
    pub max_concurrent_scrapes: usize,
    /// 每个任务的最大尝试次数
    pub max_attempts: u32,
    /// 线性退避步长
    pub retry_backoff: Duration,
    /// 保留的已完成任务数量
    pub history_limit: usize,
    /// 事件广播缓冲区大小
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_scrapes: 8,
            max_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            history_limit: 1024,
            event_capacity: 256,
        }
    }
}

/// 调度器统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorStats {
    pub queued: usize,
    pub running: usize,
    pub waiting_retry: usize,
    pub enqueued_total: u64,
    pub deduplicated_total: u64,
    pub succeeded_total: u64,
    pub failed_total: u64,
    pub cancelled_total: u64,
    pub retries_total: u64,
}

struct JobEntry {
    job: CollectionJob,
    waiters: Vec<Waiter>,
    abort: Option<AbortHandle>,
    /// 后台调度提交的任务，没有等待方也不会被取消
    detached: bool,
    retry_pending: bool,
}

#[derive(Default)]
struct OrchestratorState {
    jobs: HashMap<Uuid, JobEntry>,
    inflight: HashMap<JobKey, Uuid>,
    queue: JobQueue,
    history: VecDeque<CollectionJob>,
    stats: OrchestratorStats,
}

/// 任务凭据，用于等待结果
///
/// 在拿到结果之前丢弃凭据视为放弃等待；若任务没有其他等待方则会被取消
pub struct JobTicket {
    job_id: Uuid,
    deduplicated: bool,
    receiver: Option<oneshot::Receiver<Result<JobOutcome, JobError>>>,
    orchestrator: Weak<ScrapingOrchestrator>,
    settled: bool,
}

impl JobTicket {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// 是否合并到了已有的在途任务
    pub fn is_deduplicated(&self) -> bool {
        self.deduplicated
    }

    /// 等待任务完成
    pub async fn wait(mut self) -> Result<JobOutcome, JobError> {
        let Some(receiver) = self.receiver.take() else {
            return Err(JobError::Shutdown);
        };
        let result = receiver.await.unwrap_or(Err(JobError::Shutdown));
        self.settled = true;
        result
    }
}

impl Drop for JobTicket {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Close our receiver first so abandon() sees this waiter as gone
        self.receiver.take();
        if let Some(orchestrator) = self.orchestrator.upgrade() {
            orchestrator.abandon(self.job_id);
        }
    }
}

/// 释放并发许可后再次尝试出队
struct DispatchGuard {
    orchestrator: Arc<ScrapingOrchestrator>,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.orchestrator.pump();
    }
}

/// 抓取调度器
///
/// 接收采集任务，按优先级与数据源限流出队，在并发上限内执行，
/// 对可重试的传输错误做线性退避重试，校验响应并把结果交给所有等待方
pub struct ScrapingOrchestrator {
    transport: Arc<TransportManager>,
    health: Arc<SourceHealthMonitor>,
    validator: Arc<DataValidator>,
    rate_limiter: Arc<dyn RateLimitingService>,
    permits: Arc<Semaphore>,
    state: parking_lot::Mutex<OrchestratorState>,
    events: broadcast::Sender<JobEvent>,
    retry_policy: RetryPolicy,
    config: OrchestratorConfig,
    shutting_down: AtomicBool,
}

impl ScrapingOrchestrator {
    /// 创建调度器，并按数据源配置初始化限流
    pub fn new(
        transport: Arc<TransportManager>,
        health: Arc<SourceHealthMonitor>,
        validator: Arc<DataValidator>,
        rate_limiter: Arc<dyn RateLimitingService>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        for source in health.sources() {
            rate_limiter.configure(&source.id, source.rate_limit);
        }
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Arc::new(Self {
            transport,
            health,
            validator,
            rate_limiter,
            permits: Arc::new(Semaphore::new(config.max_concurrent_scrapes.max(1))),
            state: parking_lot::Mutex::new(OrchestratorState::default()),
            events,
            retry_policy: RetryPolicy::linear(config.max_attempts.max(1), config.retry_backoff),
            config,
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// 订阅任务完成事件
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// 提交任务并返回等待凭据
    ///
    /// 同一 (领域, 因子, 实体) 已有在途任务时，调用方会合并到该任务
    pub fn enqueue(self: &Arc<Self>, job: CollectionJob) -> Result<JobTicket, JobError> {
        let (tx, rx) = oneshot::channel();
        let (job_id, deduplicated) = self.admit(job, Some(tx), false)?;
        Ok(JobTicket {
            job_id,
            deduplicated,
            receiver: Some(rx),
            orchestrator: Arc::downgrade(self),
            settled: false,
        })
    }

    /// 提交不需要等待结果的任务，结果只通过事件广播
    pub fn enqueue_detached(self: &Arc<Self>, job: CollectionJob) -> Result<Uuid, JobError> {
        self.admit(job, None, true).map(|(id, _)| id)
    }

    /// 提交任务并等待结果
    pub async fn submit(self: &Arc<Self>, job: CollectionJob) -> Result<JobOutcome, JobError> {
        self.enqueue(job)?.wait().await
    }

    fn admit(
        self: &Arc<Self>,
        mut job: CollectionJob,
        waiter: Option<Waiter>,
        detached: bool,
    ) -> Result<(Uuid, bool), JobError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(JobError::Shutdown);
        }
        let source = self
            .health
            .get_health(&job.source_id)
            .map_err(|_| JobError::UnknownSource(job.source_id.clone()))?;
        if !source.active {
            return Err(JobError::SourceInactive(job.source_id.clone()));
        }

        let key = job.key();
        let job_id = {
            let mut state = self.state.lock();
            let OrchestratorState {
                jobs,
                inflight,
                queue,
                stats,
                ..
            } = &mut *state;

            if let Some(existing) = inflight.get(&key).copied() {
                if let Some(entry) = jobs.get_mut(&existing) {
                    entry.waiters.extend(waiter);
                    entry.detached |= detached;
                    if entry.job.state == JobState::Queued
                        && job.priority.rank() < entry.job.priority.rank()
                    {
                        entry.job.priority = job.priority;
                        if queue.remove(existing) {
                            queue.push(existing, job.priority);
                        }
                    }
                    stats.deduplicated_total += 1;
                    debug!(job_id = %existing, factor = %job.factor, "Joined in-flight job");
                    return Ok((existing, true));
                }
            }

            job.state = JobState::Queued;
            job.attempts = 0;
            let id = job.id;
            queue.push(id, job.priority);
            inflight.insert(key, id);
            jobs.insert(
                id,
                JobEntry {
                    job,
                    waiters: waiter.into_iter().collect(),
                    abort: None,
                    detached,
                    retry_pending: false,
                },
            );
            stats.enqueued_total += 1;
            gauge!("collection_queue_depth").set(queue.len() as f64);
            id
        };

        counter!("collection_jobs_enqueued_total").increment(1);
        self.pump();
        Ok((job_id, false))
    }

    /// 在并发许可和限流允许的范围内尽可能多地出队执行
    fn pump(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        loop {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                return;
            };
            let job = {
                let mut state = self.state.lock();
                let OrchestratorState { queue, jobs, .. } = &mut *state;
                let limiter = &self.rate_limiter;
                let next = queue.take_first(|id| match jobs.get(id) {
                    Some(entry) => limiter.try_acquire(&entry.job.source_id).is_allowed(),
                    None => true,
                });
                gauge!("collection_queue_depth").set(queue.len() as f64);
                let Some(id) = next else {
                    return;
                };
                let Some(entry) = jobs.get_mut(&id) else {
                    continue;
                };
                entry.job.state = JobState::Running;
                entry.job.attempts += 1;
                entry.job.started_at = Some(Utc::now());
                entry.retry_pending = false;
                entry.job.clone()
            };

            let job_id = job.id;
            let attempt = job.attempts;
            let this = Arc::clone(self);
            let task = runtime.spawn(async move {
                let _guard = DispatchGuard {
                    orchestrator: Arc::clone(&this),
                    permit: Some(permit),
                };
                this.run_job(job).await;
            });

            let mut state = self.state.lock();
            if let Some(entry) = state.jobs.get_mut(&job_id) {
                if entry.job.state == JobState::Running && entry.job.attempts == attempt {
                    entry.abort = Some(task.abort_handle());
                }
            }
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, source = %job.source_id, attempt = job.attempts))]
    async fn run_job(self: &Arc<Self>, job: CollectionJob) {
        let source = match self.health.get_health(&job.source_id) {
            Ok(source) => source,
            Err(_) => {
                self.finish(job.id, Err(JobError::UnknownSource(job.source_id.clone())));
                return;
            }
        };

        let url = join_url(&source.base_url, &job.path);
        let endpoint = self.transport.select_endpoint();
        let request = FetchRequest::new(url).with_timeout(source.timeout());
        debug!(
            job_id = %job.id,
            source = %job.source_id,
            endpoint = %endpoint.id,
            attempt = job.attempts,
            "Dispatching collection job"
        );

        let started = Instant::now();
        let result = self.transport.execute(&endpoint, request).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        histogram!("collection_job_duration_seconds", "source" => job.source_id.clone())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                let _ = self
                    .health
                    .record_request(&job.source_id, true, latency_ms, None);
                // 非 JSON 响应按字符串交给校验器，记为校验失败而不是丢弃
                let payload = serde_json::from_str::<Value>(&response.body).unwrap_or_else(|e| {
                    debug!(
                        job_id = %job.id,
                        source = %job.source_id,
                        error = %e,
                        "Response body is not JSON"
                    );
                    Value::String(response.body.clone())
                });
                let validation =
                    self.validator
                        .validate(&job.domain, &job.record_type, &payload, &job.source_id);
                self.finish(
                    job.id,
                    Ok(JobOutcome {
                        job_id: job.id,
                        source_id: job.source_id.clone(),
                        endpoint_id: endpoint.id.clone(),
                        payload,
                        validation,
                        attempts: job.attempts,
                        latency_ms,
                    }),
                );
            }
            Err(error) => {
                let message = error.to_string();
                let _ = self
                    .health
                    .record_request(&job.source_id, false, latency_ms, Some(&message));
                if !self.shutting_down.load(Ordering::SeqCst)
                    && self.retry_policy.should_retry_with_error(job.attempts, &error)
                {
                    let delay = self.retry_policy.calculate_backoff(job.attempts);
                    warn!(
                        job_id = %job.id,
                        source = %job.source_id,
                        attempt = job.attempts,
                        error = %message,
                        "Collection attempt failed, retrying in {:?}",
                        delay
                    );
                    self.schedule_retry(job.id, delay, message);
                } else {
                    self.finish(
                        job.id,
                        Err(JobError::Transport {
                            attempts: job.attempts,
                            message,
                        }),
                    );
                }
            }
        }
    }

    /// 退避结束后把任务放回队尾；期间任务已被取消则什么也不做
    fn schedule_retry(self: &Arc<Self>, job_id: Uuid, delay: Duration, message: String) {
        {
            let mut state = self.state.lock();
            let Some(entry) = state.jobs.get_mut(&job_id) else {
                return;
            };
            entry.job.state = JobState::Queued;
            entry.job.last_error = Some(message);
            entry.abort = None;
            entry.retry_pending = true;
            state.stats.retries_total += 1;
        }
        counter!("collection_job_retries_total").increment(1);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = this.state.lock();
                let priority = match state.jobs.get(&job_id) {
                    Some(entry) if entry.retry_pending => entry.job.priority,
                    _ => return,
                };
                state.queue.push(job_id, priority);
            }
            this.pump();
        });
    }

    /// 结束任务，通知所有等待方并广播事件
    fn finish(&self, job_id: Uuid, result: Result<JobOutcome, JobError>) {
        let (job, waiters) = {
            let mut state = self.state.lock();
            let Some(mut entry) = state.jobs.remove(&job_id) else {
                return;
            };
            state.queue.remove(job_id);
            let key = entry.job.key();
            if state.inflight.get(&key) == Some(&job_id) {
                state.inflight.remove(&key);
            }

            entry.job.finished_at = Some(Utc::now());
            match &result {
                Ok(_) => {
                    entry.job.state = JobState::Succeeded;
                    state.stats.succeeded_total += 1;
                }
                Err(e) => {
                    entry.job.state = JobState::Failed;
                    entry.job.last_error = Some(e.to_string());
                    if *e == JobError::Cancelled {
                        state.stats.cancelled_total += 1;
                    } else {
                        state.stats.failed_total += 1;
                    }
                }
            }

            state.history.push_back(entry.job.clone());
            while state.history.len() > self.config.history_limit {
                state.history.pop_front();
            }
            (entry.job, std::mem::take(&mut entry.waiters))
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(JobError::Cancelled) => "cancelled",
            Err(_) => "failure",
        };
        counter!(
            "collection_jobs_total",
            "domain" => job.domain.clone(),
            "outcome" => outcome
        )
        .increment(1);
        match &result {
            Ok(o) => info!(
                job_id = %job_id,
                factor = %job.factor,
                attempts = job.attempts,
                confidence = o.validation.confidence,
                "Collection job succeeded"
            ),
            Err(e) => warn!(
                job_id = %job_id,
                factor = %job.factor,
                attempts = job.attempts,
                error = %e,
                "Collection job failed"
            ),
        }

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        let _ = self.events.send(JobEvent {
            job,
            outcome: result,
        });
    }

    /// 取消任务：排队中的直接移除，执行中的中止
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let abort = {
            let mut state = self.state.lock();
            match state.jobs.get_mut(&job_id) {
                Some(entry) => entry.abort.take(),
                None => return false,
            }
        };
        if let Some(abort) = abort {
            abort.abort();
        }
        self.finish(job_id, Err(JobError::Cancelled));
        info!(job_id = %job_id, "Collection job cancelled");
        true
    }

    /// 等待方放弃等待；没有剩余等待方的任务会被取消
    fn abandon(&self, job_id: Uuid) {
        let orphaned = {
            let mut state = self.state.lock();
            match state.jobs.get_mut(&job_id) {
                Some(entry) => {
                    entry.waiters.retain(|w| !w.is_closed());
                    entry.waiters.is_empty() && !entry.detached
                }
                None => false,
            }
        };
        if orphaned {
            debug!(job_id = %job_id, "All waiters gone, cancelling job");
            self.cancel(job_id);
        }
    }

    /// 补满令牌并尝试出队被限流的任务
    pub fn refill_rate_limits(self: &Arc<Self>) {
        self.rate_limiter.refill_all();
        self.pump();
    }

    /// 停止接收新任务，取消全部未完成任务
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let pending: Vec<Uuid> = self.state.lock().jobs.keys().copied().collect();
        for job_id in &pending {
            let abort = {
                let mut state = self.state.lock();
                state.jobs.get_mut(job_id).and_then(|e| e.abort.take())
            };
            if let Some(abort) = abort {
                abort.abort();
            }
            self.finish(*job_id, Err(JobError::Shutdown));
        }
        info!(cancelled = pending.len(), "Orchestrator shut down");
    }

    /// 查询任务（包括最近完成的任务）
    pub fn job(&self, job_id: Uuid) -> Option<CollectionJob> {
        let state = self.state.lock();
        state
            .jobs
            .get(&job_id)
            .map(|e| e.job.clone())
            .or_else(|| state.history.iter().rev().find(|j| j.id == job_id).cloned())
    }

    pub fn stats(&self) -> OrchestratorStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.queued = state.queue.len();
        stats.running = state
            .jobs
            .values()
            .filter(|e| e.job.state == JobState::Running)
            .count();
        stats.waiting_retry = state.jobs.values().filter(|e| e.retry_pending).count();
        stats
    }
}

/// 拼接数据源基础地址与相对路径
pub fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
