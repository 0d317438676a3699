// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 数据传输对象模块
///
/// 定义进入采集管线的请求对象
pub mod collection_request;

pub use collection_request::CollectionRequest;
