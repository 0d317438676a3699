// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use config::{Config, Environment, File, FileFormat, FileSourceFile};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::domain::models::job::EntityRef;
use crate::domain::models::source::SourceDefinition;
use crate::domain::models::transport::{ProxyDefinition, ProxyMode};
use crate::domain::services::intelligence_engine::EngineConfig;
use crate::engines::health_monitor::{HealthMonitorConfig, HealthThresholds};
use crate::engines::transport_manager::TransportConfig;
use crate::infrastructure::cache::CacheConfig;
use crate::utils::errors::SettingsError;
use crate::workers::orchestrator::OrchestratorConfig;

const ENV_PREFIX: &str = "SPORTINTEL";

/// 应用程序配置设置
///
/// 包含数据源、传输、调度、健康监控、缓存、引擎、告警、指标与日志等配置项，
/// 每一节都有默认值，可以只覆盖需要调整的部分
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据源列表
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceDefinition>,
    /// 传输层配置
    #[serde(default)]
    pub transport: TransportSettings,
    /// 调度器配置
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    /// 健康监控配置
    #[serde(default)]
    pub health: HealthSettings,
    /// 缓存配置
    #[serde(default)]
    pub cache: CacheSettings,
    /// 情报引擎配置
    #[serde(default)]
    pub engine: EngineSettings,
    /// 告警配置
    #[serde(default)]
    pub alerts: AlertSettings,
    /// 指标配置
    #[serde(default)]
    pub metrics: MetricsSettings,
    /// 日志配置
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            transport: TransportSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            health: HealthSettings::default(),
            cache: CacheSettings::default(),
            engine: EngineSettings::default(),
            alerts: AlertSettings::default(),
            metrics: MetricsSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

fn default_sources() -> Vec<SourceDefinition> {
    [
        ("officials", "referee"),
        ("venues", "venue"),
        ("travel", "travel"),
        ("schedules", "schedule"),
        ("injuries", "injuries"),
        ("weather", "weather"),
    ]
    .into_iter()
    .map(|(id, domain_type)| {
        SourceDefinition::new(id, format!("http://localhost:8081/{}", id), domain_type)
    })
    .collect()
}

/// 传输层配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// 代理模式 (direct, free, premium)
    pub mode: ProxyMode,
    /// 连续失败多少次后隔离端点
    pub max_failures: u32,
    /// 端点请求超时（秒）
    pub endpoint_timeout_secs: u64,
    /// 探测地址
    pub probe_url: String,
    /// 探测超时（秒）
    pub probe_timeout_secs: u64,
    /// 探测间隔（秒）
    pub probe_interval_secs: u64,
    /// 隔离重置检查间隔（秒）
    pub rotation_interval_secs: u64,
    /// 付费代理是否永不隔离
    pub premium_never_ban: bool,
    /// 免费代理 URL 列表
    pub free_proxies: Vec<String>,
    /// 付费代理列表
    pub premium_proxies: Vec<ProxyDefinition>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            mode: ProxyMode::Direct,
            max_failures: 3,
            endpoint_timeout_secs: 15,
            probe_url: "https://httpbin.org/status/200".to_string(),
            probe_timeout_secs: 10,
            probe_interval_secs: 300,
            rotation_interval_secs: 1800,
            premium_never_ban: false,
            free_proxies: Vec::new(),
            premium_proxies: Vec::new(),
        }
    }
}

impl TransportSettings {
    pub fn to_config(&self) -> TransportConfig {
        TransportConfig {
            mode: self.mode,
            max_failures: self.max_failures,
            endpoint_timeout: Duration::from_secs(self.endpoint_timeout_secs),
            probe_url: self.probe_url.clone(),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            premium_never_ban: self.premium_never_ban,
            free_proxies: self.free_proxies.clone(),
            premium_proxies: self.premium_proxies.clone(),
        }
    }
}

/// 调度器配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// 最大并发抓取数
    pub max_concurrent_scrapes: usize,
    /// 每个任务的最大尝试次数
    pub max_attempts: u32,
    /// 线性退避步长（毫秒）
    pub retry_backoff_ms: u64,
    /// 令牌桶补充间隔（秒）
    pub rate_limit_refill_secs: u64,
    /// 保留的已完成任务数
    pub history_limit: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_scrapes: 8,
            max_attempts: 3,
            retry_backoff_ms: 2_000,
            rate_limit_refill_secs: 60,
            history_limit: 1024,
        }
    }
}

impl OrchestratorSettings {
    pub fn to_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_scrapes: self.max_concurrent_scrapes,
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            history_limit: self.history_limit,
            ..Default::default()
        }
    }

    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_refill_secs.max(1))
    }
}

/// 健康监控配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub response_time_warning_ms: f64,
    pub response_time_critical_ms: f64,
    pub consecutive_failures_warning: u32,
    pub consecutive_failures_critical: u32,
    pub health_score_warning: f64,
    pub health_score_critical: f64,
    pub hourly_slots: usize,
    pub daily_slots: usize,
    pub latency_smoothing: f64,
    /// 不健康后的重连次数
    pub reconnect_attempts: u32,
    /// 重连间隔（秒）
    pub reconnect_backoff_secs: u64,
    /// 不健康数据源的周期探测间隔（秒）
    pub probe_interval_secs: u64,
    /// 滚动窗口推进检查间隔（秒）
    pub window_roll_interval_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        let thresholds = HealthThresholds::default();
        let monitor = HealthMonitorConfig::default();
        Self {
            response_time_warning_ms: thresholds.response_time_warning_ms,
            response_time_critical_ms: thresholds.response_time_critical_ms,
            consecutive_failures_warning: thresholds.consecutive_failures_warning,
            consecutive_failures_critical: thresholds.consecutive_failures_critical,
            health_score_warning: thresholds.health_score_warning,
            health_score_critical: thresholds.health_score_critical,
            hourly_slots: monitor.hourly_slots,
            daily_slots: monitor.daily_slots,
            latency_smoothing: monitor.latency_smoothing,
            reconnect_attempts: 3,
            reconnect_backoff_secs: 30,
            probe_interval_secs: 300,
            window_roll_interval_secs: 60,
        }
    }
}

impl HealthSettings {
    pub fn to_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            thresholds: HealthThresholds {
                response_time_warning_ms: self.response_time_warning_ms,
                response_time_critical_ms: self.response_time_critical_ms,
                consecutive_failures_warning: self.consecutive_failures_warning,
                consecutive_failures_critical: self.consecutive_failures_critical,
                health_score_warning: self.health_score_warning,
                health_score_critical: self.health_score_critical,
            },
            hourly_slots: self.hourly_slots,
            daily_slots: self.daily_slots,
            latency_smoothing: self.latency_smoothing,
        }
    }
}

/// 缓存配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// 默认 TTL（分钟）
    pub default_ttl_minutes: u64,
    /// 按领域的 TTL（分钟）
    pub domain_ttl_minutes: HashMap<String, u64>,
    pub max_entries: usize,
    /// 过期清理间隔（秒）
    pub purge_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            default_ttl_minutes: defaults.default_ttl.as_secs() / 60,
            domain_ttl_minutes: defaults
                .domain_ttls
                .iter()
                .map(|(domain, ttl)| (domain.clone(), ttl.as_secs() / 60))
                .collect(),
            max_entries: defaults.max_entries,
            purge_interval_secs: 300,
        }
    }
}

impl CacheSettings {
    pub fn to_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_secs(self.default_ttl_minutes * 60),
            domain_ttls: self
                .domain_ttl_minutes
                .iter()
                .map(|(domain, minutes)| (domain.clone(), Duration::from_secs(minutes * 60)))
                .collect(),
            max_entries: self.max_entries,
        }
    }
}

/// 预热计划
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupSettings {
    pub domain: String,
    pub factor: String,
    pub entity: EntityRef,
    /// 采集间隔（秒）
    pub cadence_secs: u64,
}

/// 情报引擎配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// 同一实体相邻抓取的间隔（毫秒）
    pub politeness_delay_ms: u64,
    pub model_confidence_blend: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
    pub failed_validation_cap: f64,
    /// 周期预热计划
    pub warmup: Vec<WarmupSettings>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            politeness_delay_ms: defaults.politeness_delay.as_millis() as u64,
            model_confidence_blend: defaults.model_confidence_blend,
            probability_floor: defaults.probability_floor,
            probability_ceiling: defaults.probability_ceiling,
            failed_validation_cap: defaults.failed_validation_cap,
            warmup: Vec::new(),
        }
    }
}

impl EngineSettings {
    pub fn to_config(&self) -> EngineConfig {
        EngineConfig {
            politeness_delay: Duration::from_millis(self.politeness_delay_ms),
            model_confidence_blend: self.model_confidence_blend,
            probability_floor: self.probability_floor,
            probability_ceiling: self.probability_ceiling,
            failed_validation_cap: self.failed_validation_cap,
        }
    }
}

/// 告警配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// 是否把告警写入日志
    pub log: bool,
    /// 告警 Webhook 地址
    pub webhook_url: Option<String>,
    /// Webhook签名密钥
    pub webhook_secret: Option<String>,
    /// 待投递告警队列容量
    pub queue_capacity: usize,
    /// 单条告警最大投递次数
    pub max_delivery_attempts: u32,
    /// 投递超时（秒）
    pub delivery_timeout_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            log: true,
            webhook_url: None,
            webhook_secret: None,
            queue_capacity: 256,
            max_delivery_attempts: 5,
            delivery_timeout_secs: 10,
        }
    }
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    /// Prometheus 监听地址
    pub listen_addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "0.0.0.0:9000".to_string(),
        }
    }
}

/// 日志配置设置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// 输出 JSON 格式日志
    pub json: bool,
    /// 未设置 RUST_LOG 时使用的过滤规则
    pub filter: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加 `config/default`、`config/{APP_ENVIRONMENT}` 与
    /// `SPORTINTEL__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(SettingsError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, SettingsError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::load(
            vec![
                File::with_name("config/default").required(false),
                File::with_name(&format!("config/{}", env)).required(false),
            ],
            environment(),
        )
    }

    /// 从单个配置文件加载，仍然叠加环境变量
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        Self::load(vec![File::from(path)], environment())
    }

    pub(crate) fn load(
        files: Vec<File<FileSourceFile, FileFormat>>,
        env: Environment,
    ) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("transport.mode", "direct")?
            .set_default("orchestrator.max_concurrent_scrapes", 8)?;
        for file in files {
            builder = builder.add_source(file);
        }
        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验配置之间的约束
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sources.is_empty() {
            return Err(invalid("at least one source must be configured"));
        }
        let mut ids = HashSet::new();
        for source in &self.sources {
            if !ids.insert(source.id.as_str()) {
                return Err(invalid(format!("duplicate source id: {}", source.id)));
            }
            if url::Url::parse(&source.base_url).is_err() {
                return Err(invalid(format!(
                    "source {} has invalid base_url: {}",
                    source.id, source.base_url
                )));
            }
        }

        match self.transport.mode {
            ProxyMode::Free if self.transport.free_proxies.is_empty() => {
                return Err(invalid("transport.mode=free requires transport.free_proxies"));
            }
            ProxyMode::Premium if self.transport.premium_proxies.is_empty() => {
                return Err(invalid("transport.mode=premium requires transport.premium_proxies"));
            }
            _ => {}
        }
        if self.transport.max_failures == 0 {
            return Err(invalid("transport.max_failures must be at least 1"));
        }

        if self.orchestrator.max_concurrent_scrapes == 0 || self.orchestrator.max_attempts == 0 {
            return Err(invalid(
                "orchestrator.max_concurrent_scrapes and max_attempts must be at least 1",
            ));
        }

        let engine = &self.engine;
        if !(0.0..=1.0).contains(&engine.model_confidence_blend) {
            return Err(invalid("engine.model_confidence_blend must be within [0, 1]"));
        }
        if !(0.0 <= engine.probability_floor
            && engine.probability_floor < engine.probability_ceiling
            && engine.probability_ceiling <= 1.0)
        {
            return Err(invalid(
                "engine.probability_floor must be below probability_ceiling within [0, 1]",
            ));
        }
        if engine.warmup.iter().any(|w| w.cadence_secs == 0) {
            return Err(invalid("engine.warmup cadence_secs must be positive"));
        }

        if self.alerts.webhook_url.is_some() && self.alerts.webhook_secret.is_none() {
            return Err(invalid("alerts.webhook_url requires alerts.webhook_secret"));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("transport.free_proxies")
        .try_parsing(true)
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid(message.into())
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
