// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 提供预测结果与因子记录的内存 TTL 缓存
pub mod prediction_cache;

pub use prediction_cache::{CacheConfig, CacheStats, PredictionCache};
