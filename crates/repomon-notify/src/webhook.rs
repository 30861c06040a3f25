use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{NotifyError, Result};
use crate::{Notification, Notifier};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Posts each notification as a JSON document to a configured HTTP
/// endpoint.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery {
                channel: "webhook".to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.is_success() {
            debug!(url = %self.url, title = %notification.title, "webhook delivered");
            Ok(())
        } else {
            warn!(url = %self.url, status = status.as_u16(), "webhook rejected notification");
            Err(NotifyError::Delivery {
                channel: "webhook".to_string(),
                reason: format!("endpoint answered status {}", status.as_u16()),
            })
        }
    }
}
