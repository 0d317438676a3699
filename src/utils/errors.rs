// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::services::factor_collector::RegistryError;
use crate::domain::services::intelligence_engine::IntelligenceError;
use crate::engines::health_monitor::HealthError;
use crate::engines::traits::TransportError;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("配置加载失败: {0}")]
    Load(#[from] config::ConfigError),

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// Worker错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("传输错误: {0}")]
    Transport(#[from] TransportError),

    #[error("未找到数据源: {0}")]
    SourceNotFound(String),

    #[error("指标导出器错误: {0}")]
    Metrics(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

/// 管道装配错误类型
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Intelligence(#[from] IntelligenceError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}
