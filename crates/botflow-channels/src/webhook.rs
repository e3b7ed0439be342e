use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use botflow_core::config::WebhookConfig;
use botflow_core::error::{FlowError, Result};
use botflow_core::traits::MessageSink;
use botflow_core::types::OutboundMessage;

/// Delivers messages by POSTing them as JSON to a configured endpoint.
///
/// Concrete chat transports live behind that endpoint; this sink only
/// cares that the message left the building.
pub struct WebhookSink {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Botflow/0.3")
            .build()
            .map_err(|e| FlowError::Channel {
                channel: "webhook".into(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { config, client })
    }
}

impl MessageSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send(&self, recipient: &str, message: &OutboundMessage) -> BoxFuture<'_, Result<()>> {
        let payload = json!({
            "recipient": recipient,
            "message": message,
        });

        Box::pin(async move {
            debug!(url = %self.config.url, "Delivering message via webhook");

            let mut request = self.client.post(&self.config.url).json(&payload);
            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|e| FlowError::Channel {
                channel: "webhook".into(),
                message: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(FlowError::Channel {
                    channel: "webhook".into(),
                    message: format!(
                        "HTTP {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    ),
                });
            }

            Ok(())
        })
    }
}
