// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// 等待后台任务退出的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 工作管理器
///
/// 持有所有后台定时器与工作器，统一通过 `watch` 通道通知停止
pub struct WorkerManager {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    /// 不监听停止信号的任务，停止时直接中止
    detached: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
            detached: Vec::new(),
        }
    }

    /// 获取停止信号的接收端
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 启动一个固定间隔执行的定时任务
    ///
    /// # 参数
    ///
    /// * `name` - 任务名称，用于日志
    /// * `period` - 执行间隔，首次执行在一个间隔之后
    /// * `tick` - 每次触发时执行的异步闭包
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown_signal();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(task = name, period_secs = period.as_secs_f64(), "Periodic task started");
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {
                        debug!(task = name, "Periodic task tick");
                        tick().await;
                    }
                }
            }
            info!(task = name, "Periodic task stopped");
        });
        self.handles.push((name, handle));
    }

    /// 启动一个长期运行的工作器
    pub fn spawn<Fut>(&mut self, name: &'static str, worker: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        info!(task = name, "Worker started");
        self.handles.push((name, tokio::spawn(worker)));
    }

    /// 接管一个不监听停止信号的任务，停止时直接中止
    pub fn track(&mut self, name: &'static str, handle: JoinHandle<()>) {
        debug!(task = name, "Detached task tracked");
        self.detached.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len() + self.detached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 通知所有任务停止并等待退出，超时的任务会被中止
    pub async fn shutdown(&mut self) {
        info!("Shutting down workers...");
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in self.detached.drain(..) {
            debug!(task = name, "Aborting detached task");
            handle.abort();
        }

        for (name, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "Worker exited"),
                Ok(Err(e)) if e.is_cancelled() => debug!(task = name, "Worker cancelled"),
                Ok(Err(e)) => error!(task = name, "Worker panicked: {}", e),
                Err(_) => {
                    warn!(task = name, "Worker did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        info!("Workers shut down successfully");
    }

    /// 等待关闭信号并关闭工作进程
    ///
    /// 监听 Ctrl-C 并优雅地关闭所有工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
        self.shutdown().await;
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        for (_, handle) in self.handles.iter().chain(self.detached.iter()) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_ticks_until_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut manager = WorkerManager::new();
        let counter = ticks.clone();
        manager.spawn_periodic("counter", Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(155)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        manager.shutdown().await;
        assert!(manager.is_empty());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_workers_observe_shutdown_signal() {
        let mut manager = WorkerManager::new();
        let mut signal = manager.shutdown_signal();
        let stopped = Arc::new(AtomicUsize::new(0));
        let flag = stopped.clone();
        manager.spawn("listener", async move {
            let _ = signal.changed().await;
            flag.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(manager.len(), 1);

        manager.shutdown().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tracked_tasks_are_aborted() {
        let mut manager = WorkerManager::new();
        let handle = tokio::spawn(std::future::pending::<()>());
        manager.track("forever", handle);
        assert_eq!(manager.len(), 1);

        tokio::time::timeout(Duration::from_secs(1), manager.shutdown())
            .await
            .unwrap();
        assert!(manager.is_empty());
    }
}
