use std::sync::Arc;

use concierge_agent::llm::DisabledLlmClient;
use concierge_agent::{
    build_llm_client, AgentRuntime, HandlerServices, LlmClient, RuntimeSettings, TurnTrace,
};
use concierge_core::config::AppConfig;
use concierge_core::domain::conversation::ConversationId;
use concierge_core::messaging::DisabledGateway;
use concierge_core::{MessagingGateway, SystemClock};
use concierge_db::repositories::{
    SqlKnowledgeRepository, SqlListingRepository, SqlMessageRepository,
};
use concierge_db::{DbPool, SqlConversationStore};
use concierge_whatsapp::{OutreachTemplates, WhatsAppClient};
use serde::Serialize;

use crate::commands::{async_runtime, load_config, migrated_pool, CommandResult, StepError};

#[derive(Debug, Serialize)]
struct RouteOutcome<'a> {
    command: &'static str,
    status: &'static str,
    conversation_id: &'a str,
    offline: bool,
    trace: TurnTrace,
}

/// Runs one turn through the full routing pipeline against the configured
/// database and prints every decision. `offline` swaps the LLM and WhatsApp
/// for their disabled stand-ins.
pub fn run(conversation_id: &str, message: &str, offline: bool) -> CommandResult {
    let config = match load_config("route") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match async_runtime("route") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = migrated_pool(&config).await?;
        let agent = build_runtime(&config, &pool, offline)?;
        let trace = agent.route(&ConversationId::from(conversation_id), message).await;
        pool.close().await;
        Ok::<TurnTrace, StepError>(trace)
    });

    let trace = match result {
        Ok(trace) => trace,
        Err(step) => return CommandResult::from_step("route", step),
    };

    let outcome = RouteOutcome { command: "route", status: "ok", conversation_id, offline, trace };
    match serde_json::to_string_pretty(&outcome) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("route", "serialization", error.to_string(), 7),
    }
}

fn build_runtime(
    config: &AppConfig,
    pool: &DbPool,
    offline: bool,
) -> Result<AgentRuntime, StepError> {
    let llm: Arc<dyn LlmClient> = if offline {
        Arc::new(DisabledLlmClient)
    } else {
        build_llm_client(&config.llm).map_err(|error| ("llm_setup", error.to_string(), 6u8))?
    };
    let messaging: Arc<dyn MessagingGateway> = if offline || !config.whatsapp.enabled {
        Arc::new(DisabledGateway)
    } else {
        Arc::new(
            WhatsAppClient::from_config(&config.whatsapp)
                .map_err(|error| ("messaging_setup", error.to_string(), 6u8))?,
        )
    };
    let templates =
        OutreachTemplates::new().map_err(|error| ("messaging_setup", error.to_string(), 6u8))?;

    let services = HandlerServices {
        listings: Arc::new(SqlListingRepository::new(pool.clone())),
        knowledge: Arc::new(SqlKnowledgeRepository::new(pool.clone())),
        messaging,
        templates: Arc::new(templates),
        llm,
        clock: Arc::new(SystemClock),
        max_search_results: config.routing.max_search_results,
        follow_up_minutes: config.whatsapp.follow_up_minutes,
    };

    Ok(AgentRuntime::new(
        services,
        Arc::new(SqlConversationStore::new(pool.clone(), config.conversation.state_ttl_secs)),
        Arc::new(SqlMessageRepository::new(pool.clone())),
        RuntimeSettings::from_config(config),
    ))
}
