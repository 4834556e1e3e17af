use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use concierge_core::config::{AppConfig, LlmProvider};
use concierge_db::DbPool;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    llm_provider: LlmProvider,
    llm_model: String,
    whatsapp_enabled: bool,
}

impl HealthState {
    pub fn new(config: &AppConfig, db_pool: DbPool) -> Self {
        Self {
            db_pool,
            llm_provider: config.llm.provider,
            llm_model: config.llm.model.clone(),
            whatsapp_enabled: config.whatsapp.enabled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

/// Only the database decides readiness. A disabled LLM or messaging channel
/// degrades answers, not availability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub llm: HealthCheck,
    pub messaging: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        llm: llm_check(state.llm_provider, &state.llm_model),
        messaging: messaging_check(state.whatsapp_enabled),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listing WHERE is_active = 1")
        .fetch_one(pool)
        .await
    {
        Ok(active) => HealthCheck { status: "ready", detail: format!("{active} active listings") },
        Err(error) => {
            warn!(event_name = "system.health.database_degraded", error = %error);
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn llm_check(provider: LlmProvider, model: &str) -> HealthCheck {
    match provider {
        LlmProvider::Disabled => HealthCheck {
            status: "disabled",
            detail: "heuristic routing only".to_string(),
        },
        LlmProvider::OpenAi => HealthCheck { status: "ready", detail: format!("openai/{model}") },
        LlmProvider::Ollama => HealthCheck { status: "ready", detail: format!("ollama/{model}") },
    }
}

fn messaging_check(whatsapp_enabled: bool) -> HealthCheck {
    if whatsapp_enabled {
        HealthCheck { status: "ready", detail: "whatsapp cloud api".to_string() }
    } else {
        HealthCheck { status: "disabled", detail: "outreach will report send_failed".to_string() }
    }
}
