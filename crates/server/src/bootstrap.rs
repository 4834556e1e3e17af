use std::sync::Arc;

use concierge_agent::{build_llm_client, AgentRuntime, HandlerServices, LlmError, RuntimeSettings};
use concierge_core::config::{AppConfig, ConfigError, LoadOptions};
use concierge_core::messaging::DisabledGateway;
use concierge_core::{MessagingError, MessagingGateway, SystemClock};
use concierge_db::repositories::{
    SqlKnowledgeRepository, SqlListingRepository, SqlMessageRepository,
};
use concierge_db::{
    connect_with_settings, migrations, DbPool, FallbackConversationStore,
    InMemoryConversationStore, SqlConversationStore,
};
use concierge_whatsapp::{OutreachTemplates, WhatsAppClient};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("messaging setup failed: {0}")]
    Messaging(#[source] MessagingError),
    #[error("llm client setup failed: {0}")]
    Llm(#[source] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        whatsapp_enabled = config.whatsapp.enabled,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let runtime = build_runtime(&config, &db_pool)?;

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

fn build_runtime(config: &AppConfig, db_pool: &DbPool) -> Result<AgentRuntime, BootstrapError> {
    let messaging: Arc<dyn MessagingGateway> = if config.whatsapp.enabled {
        Arc::new(WhatsAppClient::from_config(&config.whatsapp).map_err(BootstrapError::Messaging)?)
    } else {
        Arc::new(DisabledGateway)
    };
    let templates = OutreachTemplates::new().map_err(BootstrapError::Messaging)?;
    let llm = build_llm_client(&config.llm).map_err(BootstrapError::Llm)?;

    let ttl_secs = config.conversation.state_ttl_secs;
    let store = FallbackConversationStore::new(
        Arc::new(SqlConversationStore::new(db_pool.clone(), ttl_secs)),
        InMemoryConversationStore::new(ttl_secs),
    );

    let services = HandlerServices {
        listings: Arc::new(SqlListingRepository::new(db_pool.clone())),
        knowledge: Arc::new(SqlKnowledgeRepository::new(db_pool.clone())),
        messaging,
        templates: Arc::new(templates),
        llm,
        clock: Arc::new(SystemClock),
        max_search_results: config.routing.max_search_results,
        follow_up_minutes: config.whatsapp.follow_up_minutes,
    };

    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        messaging_channel = services.messaging.channel(),
        "agent runtime wired"
    );

    Ok(AgentRuntime::new(
        services,
        Arc::new(store),
        Arc::new(SqlMessageRepository::new(db_pool.clone())),
        RuntimeSettings::from_config(config),
    ))
}
