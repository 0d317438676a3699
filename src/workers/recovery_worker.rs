// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::source::SourceStatus;
use crate::engines::health_monitor::SourceHealthMonitor;
use crate::engines::traits::FetchRequest;
use crate::engines::transport_manager::TransportManager;

/// 单个数据源的恢复结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// 探测成功
    Reconnected { attempts: u32 },
    /// 重试次数耗尽，等待周期探测
    Exhausted,
    /// 数据源已停用、已恢复或不存在
    Skipped,
}

/// 数据源重连工作器
///
/// 监听健康监控器的"转为不健康"事件，对每个数据源按固定间隔做有限次数的探测
pub struct RecoveryWorker {
    transport: Arc<TransportManager>,
    health: Arc<SourceHealthMonitor>,
    attempts: u32,
    backoff: Duration,
    in_progress: Arc<DashSet<String>>,
}

impl RecoveryWorker {
    pub fn new(
        transport: Arc<TransportManager>,
        health: Arc<SourceHealthMonitor>,
        attempts: u32,
        backoff: Duration,
    ) -> Self {
        Self {
            transport,
            health,
            attempts,
            backoff,
            in_progress: Arc::new(DashSet::new()),
        }
    }

    /// 运行工作器，直到事件通道关闭或收到停止信号
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<String>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            attempts = self.attempts,
            backoff_secs = self.backoff.as_secs(),
            "Source recovery worker started"
        );
        let mut tasks = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                next = events.recv() => match next {
                    Some(source_id) => {
                        if !self.in_progress.insert(source_id.clone()) {
                            debug!(source = %source_id, "Recovery already in progress");
                            continue;
                        }
                        let worker = self.clone();
                        tasks.spawn(async move {
                            worker.recover(&source_id).await;
                            worker.in_progress.remove(&source_id);
                        });
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }
        tasks.abort_all();
        info!("Source recovery worker stopped");
    }

    /// 启动后台运行
    pub fn start(
        self: Arc<Self>,
        events: mpsc::UnboundedReceiver<String>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, shutdown))
    }

    /// 对单个数据源执行有限次数的重连探测
    pub async fn recover(&self, source_id: &str) -> RecoveryOutcome {
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.backoff).await;

            match self.probe_source(source_id, attempt).await {
                Some(true) => return RecoveryOutcome::Reconnected { attempts: attempt },
                Some(false) => {}
                None => return RecoveryOutcome::Skipped,
            }
        }

        warn!(
            source = source_id,
            "Source still unhealthy after reconnection budget, waiting for periodic probe"
        );
        RecoveryOutcome::Exhausted
    }

    /// 周期探测：对每个仍不健康且没有重连任务在跑的数据源探测一次
    ///
    /// 累计失败较多的数据源可能需要多轮成功探测才能离开不健康状态
    ///
    /// # 返回值
    ///
    /// 本轮离开不健康状态的数据源数量
    pub async fn probe_unhealthy(&self) -> usize {
        let mut reconnected = 0;
        for source_id in self.health.unhealthy_sources() {
            if !self.in_progress.insert(source_id.clone()) {
                debug!(source = %source_id, "Recovery already in progress, skipping probe");
                continue;
            }
            if self.probe_source(&source_id, 1).await == Some(true)
                && self
                    .health
                    .get_health(&source_id)
                    .is_ok_and(|s| s.status != SourceStatus::Unhealthy)
            {
                reconnected += 1;
            }
            self.in_progress.remove(&source_id);
        }
        reconnected
    }

    /// 通过传输层探测一次数据源并记录结果
    ///
    /// 数据源已停用、不存在或不再是不健康状态时返回 `None`
    async fn probe_source(&self, source_id: &str, attempt: u32) -> Option<bool> {
        let source = self.health.get_health(source_id).ok()?;
        if !source.active || source.status != SourceStatus::Unhealthy {
            debug!(source = source_id, "Source no longer needs recovery");
            return None;
        }

        let endpoint = self.transport.select_endpoint();
        let request = FetchRequest::new(source.base_url.clone()).with_timeout(source.timeout());
        let start = Instant::now();
        let result = self.transport.execute(&endpoint, request).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => {
                let _ = self.health.record_request(source_id, true, latency_ms, None);
                info!(source = source_id, attempt, "Source reconnected");
                Some(true)
            }
            Err(e) => {
                let message = e.to_string();
                let _ = self
                    .health
                    .record_request(source_id, false, latency_ms, Some(&message));
                warn!(
                    source = source_id,
                    attempt,
                    max_attempts = self.attempts,
                    error = %message,
                    "Reconnection attempt failed"
                );
                Some(false)
            }
        }
    }
}

#[cfg(test)]
#[path = "recovery_worker_test.rs"]
mod tests;
