use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use super::traits::BaseWebhookNotifier;

/// Webhook client
/// POSTs the final capture record to the caller's callback URL
pub struct HttpWebhookNotifier {
    client: Client,
    timeout: Duration,
}

impl HttpWebhookNotifier {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl BaseWebhookNotifier for HttpWebhookNotifier {
    async fn notify(&self, callback_url: &str, payload: &serde_json::Value) -> Result<()> {
        info!("sending capture webhook to: {}", callback_url);

        let response = self
            .client
            .post(callback_url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Webhook request to {} failed", callback_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Webhook receiver returned {}: {}", status, body);
        }

        Ok(())
    }
}
