// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 负责把各组件按配置装配成完整的采集管线，并对外提供请求入口
pub mod dto;
pub mod pipeline;
