// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::domain::models::alert::{Alert, AlertSeverity, AlertType};
use crate::domain::models::source::{Source, SourceDefinition, SourceStatus};
use crate::infrastructure::alerts::AlertSink;

/// 健康监控错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HealthError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),
    #[error("Source already registered: {0}")]
    DuplicateSource(String),
}

/// 告警阈值
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// 平均响应时间告警阈值（毫秒）
    pub response_time_warning_ms: f64,
    pub response_time_critical_ms: f64,
    /// 连续失败告警阈值
    pub consecutive_failures_warning: u32,
    pub consecutive_failures_critical: u32,
    /// 健康评分告警阈值，低于阈值触发
    pub health_score_warning: f64,
    pub health_score_critical: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            response_time_warning_ms: 5_000.0,
            response_time_critical_ms: 10_000.0,
            consecutive_failures_warning: 3,
            consecutive_failures_critical: 5,
            health_score_warning: 70.0,
            health_score_critical: 50.0,
        }
    }
}

/// 健康监控配置
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub thresholds: HealthThresholds,
    /// 按小时统计的槽位数
    pub hourly_slots: usize,
    /// 按天统计的槽位数
    pub daily_slots: usize,
    /// 响应时间指数移动平均的平滑系数
    pub latency_smoothing: f64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::default(),
            hourly_slots: 24,
            daily_slots: 30,
            latency_smoothing: 0.2,
        }
    }
}

/// 窗口粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowGranularity {
    Hourly,
    Daily,
}

impl WindowGranularity {
    fn bucket_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let unit = match self {
            WindowGranularity::Hourly => ChronoDuration::hours(1),
            WindowGranularity::Daily => ChronoDuration::days(1),
        };
        now.duration_trunc(unit).unwrap_or(now)
    }
}

/// 滚动窗口中的一个槽位
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSlot {
    pub started_at: DateTime<Utc>,
    pub requests: u64,
    pub failures: u64,
    pub avg_response_time_ms: f64,
}

impl WindowSlot {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            requests: 0,
            failures: 0,
            avg_response_time_ms: 0.0,
        }
    }

    pub fn reliability(&self) -> Option<f64> {
        (self.requests > 0).then(|| (self.requests - self.failures) as f64 / self.requests as f64)
    }
}

/// 固定容量的滚动统计窗口
#[derive(Debug, Clone)]
pub struct RollingWindow {
    granularity: WindowGranularity,
    capacity: usize,
    slots: VecDeque<WindowSlot>,
}

impl RollingWindow {
    pub fn new(granularity: WindowGranularity, capacity: usize) -> Self {
        Self {
            granularity,
            capacity: capacity.max(1),
            slots: VecDeque::new(),
        }
    }

    /// 跨越槽位边界时开启新槽位，超出容量时丢弃最旧的槽位
    ///
    /// 返回是否发生了滚动
    pub fn advance_to(&mut self, now: DateTime<Utc>) -> bool {
        let start = self.granularity.bucket_start(now);
        if self.slots.back().map(|s| s.started_at >= start).unwrap_or(false) {
            return false;
        }
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(WindowSlot::new(start));
        true
    }

    pub fn record(&mut self, now: DateTime<Utc>, success: bool, latency_ms: f64) {
        self.advance_to(now);
        if let Some(slot) = self.slots.back_mut() {
            slot.requests += 1;
            if !success {
                slot.failures += 1;
            }
            slot.avg_response_time_ms += (latency_ms - slot.avg_response_time_ms) / slot.requests as f64;
        }
    }

    pub fn slots(&self) -> Vec<WindowSlot> {
        self.slots.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// 可靠性趋势
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTrend {
    Improving,
    Stable,
    Declining,
    InsufficientData,
}

/// 单个数据源的性能报告
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub hourly: Vec<WindowSlot>,
    pub daily: Vec<WindowSlot>,
    pub trend: HealthTrend,
}

/// 全部数据源的健康汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub inactive: usize,
    pub average_health_score: f64,
}

struct SourceEntry {
    source: Source,
    hourly: RollingWindow,
    daily: RollingWindow,
    /// 自上次恢复健康以来已触发的告警
    fired: HashSet<(AlertType, AlertSeverity)>,
}

/// 根据可靠性、响应时间和连续失败计算健康评分
///
/// 没有请求记录的数据源得满分
pub fn compute_health_score(source: &Source) -> f64 {
    if source.total_requests == 0 {
        return 100.0;
    }
    let mut score = 100.0;
    score *= source.reliability * 0.6 + 0.4;

    let expected = source.expected_response_time_ms.max(1) as f64;
    let responsiveness = (1.0 - source.avg_response_time_ms / expected).max(0.0);
    score *= 0.8 + responsiveness * 0.2;

    let penalty = (source.consecutive_failures as f64 * 0.1).min(0.5);
    score *= 1.0 - penalty;

    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// 数据源健康监控器
///
/// 为每个数据源维护可靠性、健康评分、响应时间与滚动窗口统计，
/// 在阈值越界时向已注册的告警接收方发送告警，
/// 同一 (类型, 级别) 的告警在数据源恢复健康之前只发送一次
pub struct SourceHealthMonitor {
    entries: parking_lot::RwLock<HashMap<String, SourceEntry>>,
    /// 注册顺序，保证汇总和报告稳定
    order: parking_lot::RwLock<Vec<String>>,
    sinks: parking_lot::RwLock<Vec<Arc<dyn AlertSink>>>,
    unhealthy_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<String>>>,
    config: HealthMonitorConfig,
}

impl Default for SourceHealthMonitor {
    fn default() -> Self {
        Self::new(HealthMonitorConfig::default())
    }
}

impl SourceHealthMonitor {
    /// 创建新的健康监控器
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            entries: parking_lot::RwLock::new(HashMap::new()),
            order: parking_lot::RwLock::new(Vec::new()),
            sinks: parking_lot::RwLock::new(Vec::new()),
            unhealthy_tx: parking_lot::Mutex::new(None),
            config,
        }
    }

    /// 使用一组数据源定义创建监控器
    pub fn with_sources(
        config: HealthMonitorConfig,
        definitions: impl IntoIterator<Item = SourceDefinition>,
    ) -> Result<Self, HealthError> {
        let monitor = Self::new(config);
        for definition in definitions {
            monitor.register_source(definition)?;
        }
        Ok(monitor)
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// 注册数据源
    pub fn register_source(&self, definition: SourceDefinition) -> Result<(), HealthError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&definition.id) {
            return Err(HealthError::DuplicateSource(definition.id));
        }
        let id = definition.id.clone();
        entries.insert(
            id.clone(),
            SourceEntry {
                source: Source::from_definition(definition),
                hourly: RollingWindow::new(WindowGranularity::Hourly, self.config.hourly_slots),
                daily: RollingWindow::new(WindowGranularity::Daily, self.config.daily_slots),
                fired: HashSet::new(),
            },
        );
        self.order.write().push(id.clone());
        debug!(source = %id, "Source registered");
        Ok(())
    }

    /// 注册告警接收方
    pub fn register_alert_sink(&self, sink: Arc<dyn AlertSink>) {
        info!(sink = sink.name(), "Alert sink registered");
        self.sinks.write().push(sink);
    }

    /// 订阅"转为不健康"事件，后一次订阅会替换前一次
    pub fn subscribe_unhealthy(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.unhealthy_tx.lock() = Some(tx);
        rx
    }

    /// 记录一次请求结果
    ///
    /// # 参数
    ///
    /// * `source_id` - 数据源标识
    /// * `success` - 是否成功
    /// * `latency_ms` - 请求耗时（毫秒）
    /// * `error` - 失败时的错误信息
    ///
    /// # 返回值
    ///
    /// 更新后的数据源快照
    pub fn record_request(
        &self,
        source_id: &str,
        success: bool,
        latency_ms: u64,
        error: Option<&str>,
    ) -> Result<Source, HealthError> {
        self.record_request_at(source_id, success, latency_ms, error, Utc::now())
    }

    /// 使用指定时钟记录请求结果
    pub fn record_request_at(
        &self,
        source_id: &str,
        success: bool,
        latency_ms: u64,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Source, HealthError> {
        let (alerts, became_unhealthy, snapshot) = {
            let mut entries = self.entries.write();
            let entry = entries
                .get_mut(source_id)
                .ok_or_else(|| HealthError::UnknownSource(source_id.to_string()))?;

            let latency = latency_ms as f64;
            let source = &mut entry.source;
            let previous = source.status;

            source.total_requests += 1;
            if success {
                source.successful_requests += 1;
                source.consecutive_failures = 0;
                source.last_success_at = Some(now);
            } else {
                source.consecutive_failures += 1;
                source.last_failure_at = Some(now);
                source.last_error = error.map(str::to_string);
            }
            source.avg_response_time_ms = if source.total_requests == 1 {
                latency
            } else {
                let alpha = self.config.latency_smoothing;
                alpha * latency + (1.0 - alpha) * source.avg_response_time_ms
            };
            source.reliability =
                (source.successful_requests as f64 / source.total_requests as f64).clamp(0.0, 1.0);
            source.health_score = compute_health_score(source);

            let status = self.classify(source);
            if status != previous {
                source.status = status;
                source.last_status_change = now;
                if status == SourceStatus::Healthy {
                    entry.fired.clear();
                }
                info!(
                    source = source_id,
                    from = %previous,
                    to = %status,
                    score = entry.source.health_score,
                    "Source status changed"
                );
            }

            entry.hourly.record(now, success, latency);
            entry.daily.record(now, success, latency);

            let alerts = self.evaluate_thresholds(entry, now);
            (
                alerts,
                status != previous && status == SourceStatus::Unhealthy,
                entry.source.clone(),
            )
        };

        gauge!("source_health_score", "source" => source_id.to_string()).set(snapshot.health_score);
        counter!(
            "source_requests_total",
            "source" => source_id.to_string(),
            "outcome" => if success { "success" } else { "failure" }
        )
        .increment(1);

        for alert in &alerts {
            self.dispatch(alert);
        }

        if became_unhealthy {
            warn!(
                source = source_id,
                consecutive_failures = snapshot.consecutive_failures,
                score = snapshot.health_score,
                "Source became unhealthy"
            );
            if let Some(tx) = self.unhealthy_tx.lock().as_ref() {
                let _ = tx.send(source_id.to_string());
            }
        }

        Ok(snapshot)
    }

    fn classify(&self, source: &Source) -> SourceStatus {
        let t = &self.config.thresholds;
        if source.total_requests == 0 {
            SourceStatus::Unknown
        } else if source.consecutive_failures >= t.consecutive_failures_critical
            || source.health_score < t.health_score_critical
        {
            SourceStatus::Unhealthy
        } else if source.consecutive_failures >= t.consecutive_failures_warning
            || source.health_score < t.health_score_warning
            || source.avg_response_time_ms >= t.response_time_warning_ms
        {
            SourceStatus::Degraded
        } else {
            SourceStatus::Healthy
        }
    }

    /// 检查阈值，返回尚未触发过的告警
    fn evaluate_thresholds(&self, entry: &mut SourceEntry, now: DateTime<Utc>) -> Vec<Alert> {
        let t = &self.config.thresholds;
        let source = &entry.source;
        let mut candidates = Vec::new();

        let failures = source.consecutive_failures;
        if failures >= t.consecutive_failures_critical {
            candidates.push((
                AlertType::ConsecutiveFailures,
                AlertSeverity::Critical,
                failures as f64,
                t.consecutive_failures_critical as f64,
            ));
        } else if failures >= t.consecutive_failures_warning {
            candidates.push((
                AlertType::ConsecutiveFailures,
                AlertSeverity::Warning,
                failures as f64,
                t.consecutive_failures_warning as f64,
            ));
        }

        let latency = source.avg_response_time_ms;
        if latency >= t.response_time_critical_ms {
            candidates.push((
                AlertType::ResponseTime,
                AlertSeverity::Critical,
                latency,
                t.response_time_critical_ms,
            ));
        } else if latency >= t.response_time_warning_ms {
            candidates.push((
                AlertType::ResponseTime,
                AlertSeverity::Warning,
                latency,
                t.response_time_warning_ms,
            ));
        }

        let score = source.health_score;
        if score < t.health_score_critical {
            candidates.push((
                AlertType::HealthScore,
                AlertSeverity::Critical,
                score,
                t.health_score_critical,
            ));
        } else if score < t.health_score_warning {
            candidates.push((
                AlertType::HealthScore,
                AlertSeverity::Warning,
                score,
                t.health_score_warning,
            ));
        }

        let source_id = source.id.clone();
        candidates
            .into_iter()
            .filter(|(kind, severity, _, _)| entry.fired.insert((*kind, *severity)))
            .map(|(kind, severity, value, threshold)| {
                Alert::new(kind, severity, &source_id, value, threshold, now)
            })
            .collect()
    }

    /// 把告警交给每个接收方；单个接收方出错或 panic 不影响其他接收方
    fn dispatch(&self, alert: &Alert) {
        counter!(
            "source_alerts_total",
            "type" => alert.alert_type.to_string(),
            "severity" => alert.severity.to_string()
        )
        .increment(1);

        let sinks: Vec<Arc<dyn AlertSink>> = self.sinks.read().clone();
        for sink in sinks {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.notify(alert))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(sink = sink.name(), error = %e, "Alert sink failed"),
                Err(_) => error!(sink = sink.name(), "Alert sink panicked"),
            }
        }
    }

    /// 获取数据源快照
    pub fn get_health(&self, source_id: &str) -> Result<Source, HealthError> {
        self.entries
            .read()
            .get(source_id)
            .map(|e| e.source.clone())
            .ok_or_else(|| HealthError::UnknownSource(source_id.to_string()))
    }

    /// 数据源是否存在且处于启用状态
    pub fn is_active(&self, source_id: &str) -> bool {
        self.entries
            .read()
            .get(source_id)
            .map(|e| e.source.active)
            .unwrap_or(false)
    }

    /// 停用数据源，调度器将拒绝其新任务
    pub fn deactivate(&self, source_id: &str) -> Result<(), HealthError> {
        self.set_active(source_id, false)
    }

    pub fn activate(&self, source_id: &str) -> Result<(), HealthError> {
        self.set_active(source_id, true)
    }

    fn set_active(&self, source_id: &str, active: bool) -> Result<(), HealthError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(source_id)
            .ok_or_else(|| HealthError::UnknownSource(source_id.to_string()))?;
        entry.source.active = active;
        info!(source = source_id, active, "Source activation changed");
        Ok(())
    }

    /// 推进所有数据源的窗口，用于没有请求时的时钟滚动
    pub fn roll_windows(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write();
        let mut rolled = 0;
        for entry in entries.values_mut() {
            if entry.hourly.advance_to(now) {
                rolled += 1;
            }
            entry.daily.advance_to(now);
        }
        rolled
    }

    /// 生成单个数据源的性能报告
    pub fn performance_report(&self, source_id: &str) -> Result<SourceReport, HealthError> {
        let entries = self.entries.read();
        let entry = entries
            .get(source_id)
            .ok_or_else(|| HealthError::UnknownSource(source_id.to_string()))?;
        let hourly = entry.hourly.slots();
        Ok(SourceReport {
            source: entry.source.clone(),
            trend: trend(&hourly),
            hourly,
            daily: entry.daily.slots(),
        })
    }

    /// 按注册顺序返回所有数据源
    pub fn sources(&self) -> Vec<Source> {
        let entries = self.entries.read();
        self.order
            .read()
            .iter()
            .filter_map(|id| entries.get(id).map(|e| e.source.clone()))
            .collect()
    }

    /// 当前不健康且启用的数据源
    pub fn unhealthy_sources(&self) -> Vec<String> {
        self.sources()
            .into_iter()
            .filter(|s| s.active && s.status == SourceStatus::Unhealthy)
            .map(|s| s.id)
            .collect()
    }

    /// 全局健康汇总
    pub fn summary(&self) -> HealthSummary {
        let sources = self.sources();
        let mut summary = HealthSummary {
            total: sources.len(),
            ..Default::default()
        };
        for source in &sources {
            match source.status {
                SourceStatus::Healthy => summary.healthy += 1,
                SourceStatus::Degraded => summary.degraded += 1,
                SourceStatus::Unhealthy => summary.unhealthy += 1,
                SourceStatus::Unknown => summary.unknown += 1,
            }
            if !source.active {
                summary.inactive += 1;
            }
        }
        if !sources.is_empty() {
            summary.average_health_score =
                sources.iter().map(|s| s.health_score).sum::<f64>() / sources.len() as f64;
        }
        summary
    }
}

/// 比较最近两个有数据的小时槽位的可靠性
fn trend(hourly: &[WindowSlot]) -> HealthTrend {
    let mut recent = hourly.iter().rev().filter_map(WindowSlot::reliability);
    match (recent.next(), recent.next()) {
        (Some(latest), Some(previous)) => {
            let delta = latest - previous;
            if delta > 0.05 {
                HealthTrend::Improving
            } else if delta < -0.05 {
                HealthTrend::Declining
            } else {
                HealthTrend::Stable
            }
        }
        _ => HealthTrend::InsufficientData,
    }
}

#[cfg(test)]
#[path = "health_monitor_test.rs"]
mod tests;
