// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，提供对具体技术的抽象和封装。
///
/// 包含的子模块：
/// - 告警（alerts）：日志与 Webhook 告警接收方
/// - 缓存（cache）：预测结果与因子记录的 TTL 缓存
/// - 指标（metrics）：Prometheus 导出器与指标说明
/// - 服务（services）：领域服务接口的具体实现，如令牌桶限流
///
/// 基础设施层依赖于领域层的抽象接口，领域层不感知具体实现。
pub mod alerts;
pub mod cache;
pub mod metrics;
pub mod services;
