// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 限流结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// 允许通过（已扣除一个令牌）
    Allowed,
    /// 需要等待（包含等待时间）
    RetryAfter { retry_after_seconds: u64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed)
    }
}

/// 按数据源限流的服务接口
///
/// 调度器在出队前调用 `try_acquire`，被拒绝的任务留在队列中
pub trait RateLimitingService: Send + Sync {
    /// 尝试为指定数据源获取一个令牌
    fn try_acquire(&self, source_id: &str) -> RateLimitResult;

    /// 设置数据源每分钟请求上限，0 表示不限制
    fn configure(&self, source_id: &str, requests_per_minute: u32);

    /// 将所有令牌桶补满
    fn refill_all(&self);

    /// 剩余令牌数，未配置的数据源返回 None
    fn available(&self, source_id: &str) -> Option<u32>;
}
