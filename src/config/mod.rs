// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理数据源、传输、调度、缓存与告警等配置，支持文件与环境变量叠加
pub mod settings;

pub use settings::Settings;
