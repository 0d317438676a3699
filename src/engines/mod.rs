// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 引擎模块
///
/// 抓取引擎抽象、代理端点池与数据源健康监控
pub mod health_monitor;
pub mod reqwest_engine;
pub mod traits;
pub mod transport_manager;
