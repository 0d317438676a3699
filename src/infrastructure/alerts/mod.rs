// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::models::alert::Alert;

pub mod log_sink;
pub mod webhook_sink;

pub use log_sink::LogAlertSink;
pub use webhook_sink::WebhookAlertSink;

/// 告警投递错误
#[derive(Error, Debug)]
pub enum AlertError {
    /// 投递通道已关闭
    #[error("Alert channel closed")]
    ChannelClosed,
    /// 投递队列已满
    #[error("Alert queue is full")]
    QueueFull,
    /// 其他投递错误
    #[error("Alert delivery failed: {0}")]
    Delivery(String),
}

/// 告警接收方
///
/// `notify` 在健康监控器的调用路径上同步执行，实现方应尽快返回；
/// 耗时的投递（如 HTTP）应转交给后台任务
pub trait AlertSink: Send + Sync {
    /// 接收方名称，用于日志
    fn name(&self) -> &str;

    /// 投递一条告警
    fn notify(&self, alert: &Alert) -> Result<(), AlertError>;
}
