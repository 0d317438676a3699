// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::alert::Alert;
use crate::utils::retry_policy::RetryPolicy;
use anyhow::{anyhow, Context};
use hmac::{Hmac, Mac};
use metrics::{counter, histogram};
use reqwest::{header, Client};

use sha2::Sha256;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Sportintel-Signature";
pub const ALERT_HEADER: &str = "X-Sportintel-Alert";

/// 告警 Webhook 投递工作器
///
/// 消费 `WebhookAlertSink` 的队列，把每条告警以 HMAC-SHA256 签名的 JSON POST 出去，
/// 失败时按指数退避重试，超过次数后丢弃
#[derive(Clone)]
pub struct AlertWebhookWorker {
    /// 投递地址
    url: String,
    /// Webhook 密钥
    secret: String,
    /// HTTP客户端
    client: Client,
    /// 重试策略
    policy: RetryPolicy,
    /// 单次请求超时
    timeout: Duration,
}

impl AlertWebhookWorker {
    /// 创建新的告警投递工作器
    ///
    /// # 参数
    ///
    /// * `url` - 投递地址
    /// * `secret` - 签名密钥
    /// * `max_attempts` - 单条告警最大投递次数
    /// * `timeout` - 单次请求超时
    pub fn new(
        url: impl Into<String>,
        secret: impl Into<String>,
        max_attempts: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(concat!("Sportintel-Alerts/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            url: url.into(),
            secret: secret.into(),
            client,
            policy: RetryPolicy::webhook(max_attempts.max(1)),
            timeout,
        })
    }

    /// 替换重试策略
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 运行投递循环，直到队列关闭或收到停止信号
    pub async fn run(self, mut alerts: mpsc::Receiver<Alert>, mut shutdown: watch::Receiver<bool>) {
        info!("Alert webhook worker started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Alert webhook worker stopping");
                    break;
                }
                next = alerts.recv() => match next {
                    Some(alert) => {
                        if let Err(e) = self.deliver(&alert).await {
                            error!("Dropping alert {}: {:#}", alert.id, e);
                            counter!("alert_webhook_deliveries_total", "result" => "dropped").increment(1);
                        }
                    }
                    None => break,
                }
            }
        }
    }

    /// 投递一条告警，按策略重试
    pub async fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        let body = serde_json::to_vec(alert).context("failed to serialize alert")?;
        let signature = sign(self.secret.as_bytes(), &body)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.post(alert, &body, &signature).await {
                Ok(()) => {
                    info!("Alert {} delivered on attempt {}", alert.id, attempt);
                    counter!("alert_webhook_deliveries_total", "result" => "delivered").increment(1);
                    return Ok(());
                }
                Err(e) if self.policy.should_retry(attempt) => {
                    let backoff = self.policy.calculate_backoff(attempt);
                    warn!(
                        "Alert {} delivery attempt {} failed: {:#}; retrying in {:?}",
                        alert.id, attempt, e, backoff
                    );
                    counter!("alert_webhook_deliveries_total", "result" => "retry").increment(1);
                    sleep(backoff).await;
                }
                Err(e) => {
                    return Err(e.context(format!("gave up after {} attempts", attempt)));
                }
            }
        }
    }

    async fn post(&self, alert: &Alert, body: &[u8], signature: &str) -> anyhow::Result<()> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(ALERT_HEADER, alert.alert_type.to_string())
            .body(body.to_vec())
            .timeout(self.timeout)
            .send()
            .await
            .context("webhook request failed")?;
        histogram!("alert_webhook_delivery_duration_seconds").record(start.elapsed().as_secs_f64());

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("webhook responded with status {}", response.status()))
        }
    }
}

/// 计算请求体的十六进制 HMAC-SHA256 签名
pub fn sign(secret: &[u8], body: &[u8]) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| anyhow!("invalid webhook secret: {}", e))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
