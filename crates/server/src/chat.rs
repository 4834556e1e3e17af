use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use concierge_agent::AgentRuntime;
use concierge_core::domain::conversation::ConversationId;
use concierge_core::{ChatResponse, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const MAX_MESSAGE_CHARS: usize = 4_000;
const MAX_CONVERSATION_ID_CHARS: usize = 128;

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

/// `InterfaceError` rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, message.clone())
            }
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.user_message().to_string())
            }
            InterfaceError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.user_message().to_string())
            }
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new().route("/api/chat", post(chat)).with_state(ChatState { runtime })
}

pub async fn chat(
    State(state): State<ChatState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let Json(request) = payload.map_err(|rejection| {
        bad_request(format!("invalid request body: {}", rejection.body_text()), &correlation_id)
    })?;
    let conversation_id = validate(&request, &correlation_id)?;

    info!(
        event_name = "http.chat.received",
        correlation_id = %correlation_id,
        conversation_id = %conversation_id,
        message_chars = request.message.chars().count(),
    );

    let response = state.runtime.handle_turn(&conversation_id, &request.message).await;
    Ok(Json(response))
}

fn validate(request: &ChatRequest, correlation_id: &str) -> Result<ConversationId, ApiError> {
    let conversation_id = request.conversation_id.trim();
    if conversation_id.is_empty() {
        return Err(bad_request("conversation_id must not be empty", correlation_id));
    }
    if conversation_id.chars().count() > MAX_CONVERSATION_ID_CHARS {
        return Err(bad_request(
            format!("conversation_id must be at most {MAX_CONVERSATION_ID_CHARS} characters"),
            correlation_id,
        ));
    }
    if request.message.trim().is_empty() {
        return Err(bad_request("message must not be empty", correlation_id));
    }
    if request.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(bad_request(
            format!("message must be at most {MAX_MESSAGE_CHARS} characters"),
            correlation_id,
        ));
    }
    Ok(ConversationId::from(conversation_id))
}

fn bad_request(message: impl Into<String>, correlation_id: &str) -> ApiError {
    let message = message.into();
    warn!(event_name = "http.chat.rejected", correlation_id = %correlation_id, reason = %message);
    ApiError(InterfaceError::BadRequest { message, correlation_id: correlation_id.to_string() })
}
