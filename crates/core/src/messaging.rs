use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("messaging gateway is not configured: {0}")]
    NotConfigured(String),
    #[error("messaging transport failed: {0}")]
    Transport(String),
    #[error("messaging provider rejected the message (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("messaging template failed: {0}")]
    Template(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl OutboundMessage {
    pub fn text(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self { to: to.into(), text: text.into(), media_url: None }
    }
}

/// What the routing core needs back from a send: did it go out, and under
/// which provider id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub ok: bool,
    pub message_id: Option<String>,
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    fn channel(&self) -> &'static str;
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, MessagingError>;
}

/// Gateway used when outbound messaging is disabled in config.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledGateway;

#[async_trait]
impl MessagingGateway for DisabledGateway {
    fn channel(&self) -> &'static str {
        "disabled"
    }

    async fn send(&self, _message: &OutboundMessage) -> Result<SendReceipt, MessagingError> {
        Err(MessagingError::NotConfigured("whatsapp.enabled is false".to_string()))
    }
}
