// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::services::rate_limiting_service::{RateLimitResult, RateLimitingService};

/// 单个数据源的令牌桶
#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: u32,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        self.tokens = self.capacity;
        self.last_refill = Instant::now();
    }
}

/// 内存令牌桶限流实现
///
/// 每个刷新周期将令牌补满；除了定时器调用 `refill_all` 之外，
/// 获取令牌时也会按经过的时间惰性补充
pub struct TokenBucketRateLimiter {
    buckets: DashMap<String, TokenBucket>,
    refill_interval: Duration,
    default_rpm: u32,
}

impl TokenBucketRateLimiter {
    /// 创建新的限流器
    ///
    /// # 参数
    ///
    /// * `default_rpm` - 未显式配置的数据源使用的每分钟请求数
    /// * `refill_interval` - 令牌补满周期，通常为一分钟
    pub fn new(default_rpm: u32, refill_interval: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            refill_interval,
            default_rpm,
        }
    }
}

impl Default for TokenBucketRateLimiter {
    fn default() -> Self {
        Self::new(60, Duration::from_secs(60))
    }
}

impl RateLimitingService for TokenBucketRateLimiter {
    fn try_acquire(&self, source_id: &str) -> RateLimitResult {
        let mut bucket = self
            .buckets
            .entry(source_id.to_string())
            .or_insert_with(|| TokenBucket::new(self.default_rpm));

        if bucket.capacity == 0 {
            return RateLimitResult::Allowed;
        }

        let elapsed = bucket.last_refill.elapsed();
        if elapsed >= self.refill_interval {
            bucket.refill();
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            RateLimitResult::Allowed
        } else {
            let remaining = self
                .refill_interval
                .saturating_sub(bucket.last_refill.elapsed());
            debug!(source = source_id, "Rate limit reached, {:?} until refill", remaining);
            RateLimitResult::RetryAfter {
                retry_after_seconds: remaining.as_secs().max(1),
            }
        }
    }

    fn configure(&self, source_id: &str, requests_per_minute: u32) {
        self.buckets
            .insert(source_id.to_string(), TokenBucket::new(requests_per_minute));
    }

    fn refill_all(&self) {
        for mut bucket in self.buckets.iter_mut() {
            bucket.refill();
        }
    }

    fn available(&self, source_id: &str) -> Option<u32> {
        self.buckets.get(source_id).map(|b| b.tokens)
    }
}
