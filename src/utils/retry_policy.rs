// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use crate::engines::traits::TransportError;

/// 退避方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// 第 n 次重试等待 n * initial_backoff
    Linear,
    /// 第 n 次重试等待 initial_backoff * multiplier^(n-1)
    Exponential,
}

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避方式
    pub strategy: BackoffStrategy,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(3, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// 采集任务使用的线性退避，无抖动
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: step,
            max_backoff: Duration::from_secs(300),
            strategy: BackoffStrategy::Linear,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
            enable_jitter: false,
        }
    }

    /// 告警投递使用的指数退避，带抖动
    pub fn webhook(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }

    /// 计算第 `attempt` 次失败后的退避时间（attempt 从 1 开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base_secs = match self.strategy {
            BackoffStrategy::Linear => self.initial_backoff.as_secs_f64() * attempt as f64,
            BackoffStrategy::Exponential => {
                self.initial_backoff.as_secs_f64()
                    * self.backoff_multiplier.powi(attempt as i32 - 1)
            }
        };

        // 限制最大退避时间
        let capped = base_secs.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.enable_jitter && self.jitter_factor > 0.0 && capped > 0.0 {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 已尝试 `attempts` 次后是否还能再试
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// 根据传输错误类型判断是否应该重试
    pub fn should_retry_with_error(&self, attempts: u32, error: &TransportError) -> bool {
        self.should_retry(attempts) && error.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_linear() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(4));
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(6));
    }

    #[test]
    fn test_calculate_backoff_exponential() {
        let mut policy = RetryPolicy::webhook(5);
        policy.enable_jitter = false; // 禁用抖动以获得精确值

        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(1));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_calculate_backoff_with_jitter() {
        let policy = RetryPolicy::webhook(5);
        let backoff = policy.calculate_backoff(2);
        // 应该接近 2 秒，但有 ±10% 的抖动
        assert!(backoff >= Duration::from_millis(1800));
        assert!(backoff <= Duration::from_millis(2200));
    }

    #[test]
    fn test_calculate_backoff_max_limit() {
        let mut policy = RetryPolicy::linear(100, Duration::from_secs(10));
        policy.max_backoff = Duration::from_secs(25);
        assert_eq!(policy.calculate_backoff(10), Duration::from_secs(25));
    }

    #[test]
    fn test_should_retry_with_error() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(10));

        assert!(policy.should_retry_with_error(1, &TransportError::HttpStatus(503)));
        assert!(policy.should_retry_with_error(2, &TransportError::Timeout(Duration::from_secs(1))));
        assert!(!policy.should_retry_with_error(3, &TransportError::HttpStatus(503)));
        assert!(!policy.should_retry_with_error(1, &TransportError::HttpStatus(404)));
    }
}
