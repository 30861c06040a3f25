//! Delivery channels for finished reports. Notification is best-effort:
//! callers fire and forget, and a failed delivery never fails a report
//! run.

pub mod error;
pub mod webhook;

pub use error::{NotifyError, Result};
pub use webhook::WebhookNotifier;

use async_trait::async_trait;

/// A message announcing a finished report.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Filesystem path or URL of the stored report, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            report_path: None,
        }
    }

    pub fn with_report_path(mut self, path: impl Into<String>) -> Self {
        self.report_path = Some(path.into());
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<()>;
}
