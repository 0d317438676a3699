// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 数据源（source）：外部数据提供方及其健康统计
/// - 传输端点（transport）：直连或代理出口
/// - 采集任务（job）：针对单个因子的抓取任务及其结果
/// - 校验结果（validation）：记录的错误、警告、异常与置信度
/// - 因子（factor）与预测（prediction）：情报引擎的输入和输出
/// - 告警（alert）：健康阈值越界通知
pub mod alert;
pub mod factor;
pub mod job;
pub mod prediction;
pub mod source;
pub mod transport;
pub mod validation;
