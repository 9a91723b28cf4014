use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
struct WebhookMessage {
    text: String,
    timestamp: String,
    severity: String,
}

/// Fire-and-forget webhook alerts for operator-visible events.
///
/// Disabled unless `AEGISEDGE_WEBHOOK_URL` is set. Delivery runs on a
/// spawned task so the request path never waits on the webhook endpoint;
/// failures are logged and dropped.
pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn from_env() -> Self {
        let url = std::env::var("AEGISEDGE_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.is_empty());
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Dispatch an alert. Returns immediately.
    pub fn alert(&self, text: &str, severity: &str) {
        let Some(url) = self.url.clone() else {
            return;
        };

        let payload = WebhookMessage {
            text: format!("[AegisEdge Alert] {text}"),
            timestamp: chrono::Utc::now().to_rfc3339(),
            severity: severity.to_string(),
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    warn!(status = %resp.status(), "webhook returned non-success status");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "failed to send webhook alert"),
            }
        });
    }
}
