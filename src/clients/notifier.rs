//! 完成通知协作方
//!
//! 通过通知网关给提交用户发送"评估已完成"消息。尽力而为：失败记录
//! 日志并作为非致命的失败事件上报，绝不影响评估结果本身。

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::error::{CollaboratorError, EvalError, EvalResult};

/// 通知协作方接口
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> EvalResult<()>;
}

/// 通知网关 HTTP 实现
pub struct HttpNotifier {
    http: reqwest::Client,
    base_url: String,
    sender_name: String,
}

impl HttpNotifier {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.notify_api_base_url.clone(),
            sender_name: config.notify_sender_name.clone(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> EvalResult<()> {
        let endpoint = format!("{}/send", self.base_url);
        debug!("发送完成通知: {}", recipient);

        let response = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({
                "from": self.sender_name,
                "to": recipient,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EvalError::Collaborator(CollaboratorError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body: crate::utils::logging::truncate_text(&body, 200),
            }));
        }

        debug!("✓ 通知已发送");
        Ok(())
    }
}
