// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use tokio::sync::mpsc::{self, error::TrySendError};

use super::{AlertError, AlertSink};
use crate::domain::models::alert::Alert;

/// 把告警放入有界队列，由 `AlertWebhookWorker` 异步投递
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    sender: mpsc::Sender<Alert>,
}

impl WebhookAlertSink {
    /// 创建接收方及其对应的队列消费端
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        self.sender.try_send(alert.clone()).map_err(|e| match e {
            TrySendError::Full(_) => AlertError::QueueFull,
            TrySendError::Closed(_) => AlertError::ChannelClosed,
        })
    }
}
