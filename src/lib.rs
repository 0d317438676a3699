// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 按配置装配完整的采集与情报管线
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、数据校验、因子采集器与情报引擎
pub mod domain;

/// 引擎模块
///
/// 抓取引擎、代理端点池与数据源健康监控
pub mod engines;

/// 基础设施模块
///
/// 提供告警接收方、预测缓存、指标导出与限流实现
pub mod infrastructure;

/// 队列模块
///
/// 实现采集任务优先级队列和周期调度
pub mod queue;

/// 工具模块
///
/// 提供错误类型、重试策略与日志初始化
pub mod utils;

/// 工作器模块
///
/// 实现采集调度器、后台工作器与定时器管理
pub mod workers;
