use tracing::{debug, info};

use concierge_core::domain::intent::IntentType;
use concierge_core::domain::requirements::SearchRequirements;

use crate::conversation::RequirementExtractor;
use crate::handlers::outreach::{self, OutreachTarget};
use crate::handlers::{fallback, knowledge, search, status};
use crate::handlers::{HandlerOutcome, HandlerServices, TurnContext};
use crate::requirements::RequirementsParser;

/// A tool invocation with its arguments already resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Search { requirements: SearchRequirements },
    Outreach { target: OutreachTarget },
    StatusCheck,
    Knowledge { query: String },
    Clarify { question: String },
    Fallback,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Outreach { .. } => "outreach",
            Self::StatusCheck => "status_check",
            Self::Knowledge { .. } => "knowledge",
            Self::Clarify { .. } => "clarify",
            Self::Fallback => "fallback",
        }
    }
}

/// Turns an intent into an [`Action`] and runs it.
pub struct Dispatcher {
    services: HandlerServices,
    requirements: RequirementsParser,
    extractor: RequirementExtractor,
}

impl Dispatcher {
    pub fn new(services: HandlerServices) -> Self {
        let requirements = RequirementsParser::new(services.llm.clone());
        Self { services, requirements, extractor: RequirementExtractor::new() }
    }

    pub async fn plan(&self, intent: IntentType, turn: &TurnContext<'_>) -> Action {
        match intent {
            IntentType::PropertySearch => Action::Search {
                requirements: search::build_requirements(&self.requirements, turn).await,
            },
            IntentType::AgentOutreach => {
                Action::Outreach { target: outreach::plan_target(turn, &self.extractor) }
            }
            IntentType::StatusUpdate => Action::StatusCheck,
            IntentType::KnowledgeQuery => Action::Knowledge { query: turn.text.to_string() },
            IntentType::ConversationContinuation
            | IntentType::FollowUp
            | IntentType::GeneralChat => Action::Fallback,
        }
    }

    /// Runs `action`. When no tool applies, the heuristics get one more look
    /// before the turn is handed to free-form chat.
    pub async fn dispatch(&self, action: Action, turn: &TurnContext<'_>) -> HandlerOutcome {
        debug!(
            event_name = "dispatch.action",
            conversation_id = %turn.conversation_id,
            action = action.name(),
        );
        if let Some(outcome) = self.run_tool(action, turn).await {
            return outcome;
        }

        if let Some(recovered) = fallback::retest(turn) {
            info!(
                event_name = "dispatch.fallback_recovered",
                conversation_id = %turn.conversation_id,
                intent = recovered.as_str(),
            );
            let action = self.plan(recovered, turn).await;
            if let Some(outcome) = self.run_tool(action, turn).await {
                return outcome;
            }
        }

        fallback::chat(&self.services, turn).await
    }

    async fn run_tool(&self, action: Action, turn: &TurnContext<'_>) -> Option<HandlerOutcome> {
        let services = &self.services;
        let outcome = match action {
            Action::Search { requirements } => search::handle(services, turn, requirements).await,
            Action::Outreach { target } => outreach::handle(services, turn, target).await,
            Action::StatusCheck => status::handle(services, turn).await,
            Action::Knowledge { query } => knowledge::handle(services, turn, &query).await,
            Action::Clarify { question } => HandlerOutcome::clarify(question, turn.language),
            Action::Fallback => return None,
        };
        Some(outcome)
    }
}
