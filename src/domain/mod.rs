// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：数据源、任务、校验结果、因子与预测
/// - 服务（services）：数据校验、因子采集器、情报引擎与限流抽象
///
/// 领域层不依赖具体的网络实现，传输细节通过 `engines` 中的 trait 注入。
pub mod models;
pub mod services;
