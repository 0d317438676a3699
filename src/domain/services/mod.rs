// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含采集管线中与传输无关的业务逻辑：
/// - 数据校验（data_validator / validation_rules）：按领域与记录类型校验原始记录
/// - 因子采集器（factor_collector / collectors）：各领域的因子列表、权重与影响规则
/// - 情报引擎（intelligence_engine）：按序采集因子、聚合预测并缓存
/// - 限流接口（rate_limiting_service）：按数据源的令牌桶抽象
pub mod collectors;
pub mod data_validator;
pub mod factor_collector;
pub mod intelligence_engine;
pub mod rate_limiting_service;
pub mod validation_rules;
