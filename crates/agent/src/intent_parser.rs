use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use concierge_core::domain::conversation::PendingAction;
use concierge_core::domain::intent::{IntentPayload, IntentResult};
use concierge_core::Language;

use crate::llm::{extract_json_object, ChatMessage, CompletionRequest, LlmClient};

const SYSTEM_PROMPT: &str = "You classify messages sent to a North Cyprus real-estate concierge. \
Reply with a single JSON object and nothing else:
{
  \"intent_type\": one of \"property_search\", \"agent_outreach\", \"status_update\", \
\"knowledge_query\", \"conversation_continuation\", \"follow_up\", \"general_chat\",
  \"confidence\": number between 0 and 1,
  \"needs_tool\": boolean,
  \"tool_name\": one of \"search_listings\", \"initiate_contact_with_seller\", \
\"check_outreach_status\", \"search_knowledge_base\", or null,
  \"language\": ISO 639-1 code of the user's message,
  \"category\": short string or null,
  \"subcategory\": short string or null,
  \"reasoning\": one short sentence
}
property_search: looking for a place to rent or buy, or refining such a search.
agent_outreach: asking us to contact a listing's agent or owner.
status_update: asking whether an agent has replied or sent photos.
knowledge_query: questions about living in North Cyprus (residency, banking, utilities).
If needs_tool is true, tool_name must be set.";

/// Everything the parser sends alongside the user's message.
#[derive(Clone, Debug, Default)]
pub struct IntentParserInput<'a> {
    pub message: &'a str,
    pub history_summary: &'a str,
    pub language: Language,
    pub pending_actions: &'a [PendingAction],
}

/// Single LLM classification call. Never fails: anything unusable comes back
/// as `IntentResult::fallback()`.
pub struct IntentParser {
    llm: Arc<dyn LlmClient>,
}

impl IntentParser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn parse(&self, input: &IntentParserInput<'_>) -> IntentResult {
        let payload = json!({
            "message": input.message,
            "history_summary": input.history_summary,
            "language": input.language.code(),
            "pending_actions_json": input.pending_actions,
        });
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(payload.to_string()),
        ])
        .json()
        .with_temperature(0.0);

        let content = match self.llm.complete(&request).await {
            Ok(content) => content,
            Err(error) => {
                warn!(
                    event_name = "intent_parser.llm_failed",
                    error = %error,
                    "using fallback intent"
                );
                return IntentResult::fallback();
            }
        };

        match parse_intent(&content) {
            Ok(result) => result,
            Err(reason) => {
                warn!(
                    event_name = "intent_parser.invalid_output",
                    reason = %reason,
                    "using fallback intent"
                );
                IntentResult::fallback()
            }
        }
    }
}

fn parse_intent(content: &str) -> Result<IntentResult, String> {
    let object = extract_json_object(content).ok_or_else(|| "no json object".to_string())?;
    let payload: IntentPayload =
        serde_json::from_str(object).map_err(|e| format!("invalid json: {e}"))?;
    IntentResult::try_from(payload).map_err(|e| e.to_string())
}
