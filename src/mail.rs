//! Outbound email through a JSON HTTP relay.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::MailConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

/// Posts one message per recipient to a transactional mail API.
#[derive(Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(&self.config.api_url)
            .header("api-key", &self.config.api_key)
            .json(&json!({
                "sender": { "email": self.config.sender },
                "to": [{ "email": to }],
                "subject": subject,
                "htmlContent": html,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("mail relay answered {status}: {body}");
        }
        Ok(())
    }
}
