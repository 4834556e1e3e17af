use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use concierge_core::config::WhatsAppConfig;
use concierge_core::{MessagingError, MessagingGateway, OutboundMessage, SendReceipt};

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Outbound client for the WhatsApp Cloud API.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    access_token: SecretString,
    phone_number_id: String,
    base_url: String,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

impl WhatsAppClient {
    pub fn from_config(config: &WhatsAppConfig) -> Result<Self, MessagingError> {
        if !config.enabled {
            return Err(MessagingError::NotConfigured("whatsapp.enabled is false".to_string()));
        }
        let phone_number_id = config
            .phone_number_id
            .clone()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                MessagingError::NotConfigured("whatsapp.phone_number_id is missing".to_string())
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MessagingError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            access_token: config.access_token.clone(),
            phone_number_id,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Points the client at another host (a mock server in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }
}

/// Builds the Cloud API payload. Recipients are bare digits, no `+`.
fn payload(message: &OutboundMessage) -> Value {
    let to: String = message.to.chars().filter(char::is_ascii_digit).collect();
    let mut payload = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
    });

    match &message.media_url {
        Some(link) => {
            payload["type"] = json!("image");
            payload["image"] = json!({ "link": link, "caption": message.text });
        }
        None => {
            payload["type"] = json!("text");
            payload["text"] = json!({ "preview_url": false, "body": message.text });
        }
    }
    payload
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl MessagingGateway for WhatsAppClient {
    fn channel(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, MessagingError> {
        let body = payload(message);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(
                    event_name = "whatsapp.send.retry",
                    attempt,
                    "retrying whatsapp send after transient error"
                );
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }

            let response = match self
                .http
                .post(self.endpoint())
                .bearer_auth(self.access_token.expose_secret())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(MessagingError::Transport(e.to_string()));
                    continue;
                }
            };

            let status = response.status();
            debug!(event_name = "whatsapp.send.response", status = %status, attempt);

            if status.is_success() {
                let parsed: SendResponse = response
                    .json()
                    .await
                    .map_err(|e| MessagingError::Transport(format!("invalid response: {e}")))?;
                let message_id = parsed.messages.into_iter().next().map(|sent| sent.id);
                return Ok(SendReceipt { ok: true, message_id });
            }

            let text = response.text().await.unwrap_or_default();
            let error = MessagingError::Rejected { status: status.as_u16(), body: text };
            if !is_transient(status) {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| MessagingError::Transport("send failed after retries".to_string())))
    }
}
