//! One handler per action. Handlers never fail: every path, including
//! repository and integration errors, ends in a well-formed `ChatResponse`.

use std::sync::Arc;

use concierge_core::domain::conversation::{
    ConversationId, ConversationState, PendingAction,
};
use concierge_core::domain::intent::IntentType;
use concierge_core::domain::listing::ListingId;
use concierge_core::domain::requirements::SearchRequirements;
use concierge_core::{ChatResponse, Clock, Language, MessagingGateway};
use concierge_db::repositories::{KnowledgeRepository, ListingRepository};
use concierge_whatsapp::OutreachTemplates;

use crate::heuristics::HeuristicSignals;
use crate::llm::LlmClient;

pub mod fallback;
pub mod knowledge;
pub mod outreach;
pub mod search;
pub mod status;

pub use outreach::{OutreachFailure, OutreachResult, OutreachTarget};

/// Collaborators shared by every handler.
#[derive(Clone)]
pub struct HandlerServices {
    pub listings: Arc<dyn ListingRepository>,
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub messaging: Arc<dyn MessagingGateway>,
    pub templates: Arc<OutreachTemplates>,
    pub llm: Arc<dyn LlmClient>,
    pub clock: Arc<dyn Clock>,
    pub max_search_results: usize,
    pub follow_up_minutes: i64,
}

/// Per-turn inputs assembled by the runtime.
#[derive(Clone, Copy, Debug)]
pub struct TurnContext<'a> {
    pub conversation_id: &'a ConversationId,
    pub text: &'a str,
    pub language: Language,
    pub state: &'a ConversationState,
    /// Pending actions as refreshed by the tracker for this turn.
    pub pending: &'a [PendingAction],
    pub signals: HeuristicSignals,
    pub history_summary: &'a str,
    /// Continuity kept the previous topic, so the text refines it.
    pub refinement: bool,
}

/// A handler's reply plus the state changes it implies. The runtime applies
/// them; handlers never touch `ConversationState` directly.
#[derive(Clone, Debug)]
pub struct HandlerOutcome {
    pub response: ChatResponse,
    /// Intent that actually ran; `None` for clarifications.
    pub intent: Option<IntentType>,
    pub recommendations: Option<Vec<ListingId>>,
    pub requirements: Option<SearchRequirements>,
    pub new_pending: Option<PendingAction>,
    pub pending_updates: Vec<PendingAction>,
    pub outreach: Option<OutreachResult>,
}

impl HandlerOutcome {
    pub fn reply(intent: Option<IntentType>, response: ChatResponse) -> Self {
        Self {
            response,
            intent,
            recommendations: None,
            requirements: None,
            new_pending: None,
            pending_updates: Vec::new(),
            outreach: None,
        }
    }

    pub fn clarify(question: impl Into<String>, language: Language) -> Self {
        Self::reply(None, ChatResponse::text(question, language))
    }
}
