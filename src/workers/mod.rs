// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供后台任务处理和工作器管理功能
/// 包括采集调度、数据源重连、告警投递和定时器生命周期管理
pub mod manager;
pub mod orchestrator;
pub mod recovery_worker;
pub mod webhook_worker;

pub use manager::WorkerManager;
pub use orchestrator::ScrapingOrchestrator;
