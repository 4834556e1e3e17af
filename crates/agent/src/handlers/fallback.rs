use tracing::warn;

use concierge_core::domain::intent::IntentType;
use concierge_core::ChatResponse;

use super::{HandlerOutcome, HandlerServices, TurnContext};
use crate::llm::{ChatMessage, CompletionRequest};

const SYSTEM_PROMPT: &str = "You are a friendly property concierge for North Cyprus. \
You help people find rentals and homes for sale, contact listing agents for them, and answer \
practical questions about living on the island. Keep replies short and conversational. \
Never invent listings, prices or agent replies.";

/// Intent recovered from the keyword heuristics when no tool ran. Outreach
/// first, then status or photos, then search.
pub fn retest(turn: &TurnContext<'_>) -> Option<IntentType> {
    let signals = &turn.signals;
    if signals.agent_outreach {
        Some(IntentType::AgentOutreach)
    } else if signals.status_update || signals.asked_for_photos {
        Some(IntentType::StatusUpdate)
    } else if signals.property_search {
        Some(IntentType::PropertySearch)
    } else {
        None
    }
}

/// Free-form reply from the model with the recent history as context.
pub async fn chat(services: &HandlerServices, turn: &TurnContext<'_>) -> HandlerOutcome {
    let mut prompt = String::new();
    if !turn.history_summary.is_empty() {
        prompt.push_str("Conversation so far:\n");
        prompt.push_str(turn.history_summary);
        prompt.push_str("\n\n");
    }
    prompt.push_str("User: ");
    prompt.push_str(turn.text);

    let request = CompletionRequest::new(vec![
        ChatMessage::system(format!(
            "{SYSTEM_PROMPT} Reply in the language with code `{}`.",
            turn.language.code()
        )),
        ChatMessage::user(prompt),
    ]);

    let response = match services.llm.complete(&request).await {
        Ok(reply) if !reply.trim().is_empty() => ChatResponse::text(reply.trim(), turn.language),
        Ok(_) => ChatResponse::apology(turn.language),
        Err(error) => {
            warn!(
                event_name = "fallback.llm_failed",
                conversation_id = %turn.conversation_id,
                error = %error,
            );
            ChatResponse::text(
                "I can help you find a property, contact a listing's agent, or answer questions \
                 about living in North Cyprus. What would you like to do?",
                turn.language,
            )
        }
    };

    HandlerOutcome::reply(Some(IntentType::GeneralChat), response)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use concierge_core::domain::conversation::{ConversationId, ConversationState};
    use concierge_core::domain::intent::IntentType;
    use concierge_core::Language;

    use super::{chat, retest};
    use crate::handlers::TurnContext;
    use crate::heuristics::HeuristicSignals;
    use crate::llm::ScriptedLlmClient;
    use crate::test_support::Fixture;

    fn turn<'a>(
        id: &'a ConversationId,
        text: &'a str,
        state: &'a ConversationState,
    ) -> TurnContext<'a> {
        TurnContext {
            conversation_id: id,
            text,
            language: Language::En,
            state,
            pending: &[],
            signals: HeuristicSignals::classify(text),
            history_summary: "user: hi\nassistant: hello!",
            refinement: false,
        }
    }

    #[test]
    fn retest_recovers_tool_intents() {
        let id = ConversationId::from("c1");
        let empty = ConversationState::default();

        assert_eq!(retest(&turn(&id, "2+1 in Girne", &empty)), Some(IntentType::PropertySearch));
        assert_eq!(
            retest(&turn(&id, "any update on the photos?", &empty)),
            Some(IntentType::StatusUpdate)
        );
        assert_eq!(
            retest(&turn(&id, "contact the agent", &empty)),
            Some(IntentType::AgentOutreach)
        );
        assert_eq!(retest(&turn(&id, "thanks!", &empty)), None);
    }

    #[tokio::test]
    async fn chat_passes_history_and_returns_the_reply() {
        let llm = Arc::new(ScriptedLlmClient::new([Ok("  You're welcome!  ".to_string())]));
        let fixture = Fixture::with_listings(Vec::new()).await.with_llm(llm.clone());
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = chat(&fixture.services(), &turn(&id, "thanks!", &state)).await;
        assert_eq!(outcome.response.message, "You're welcome!");
        assert_eq!(outcome.intent, Some(IntentType::GeneralChat));
        assert!(llm.requests()[0].messages[1].content.contains("assistant: hello!"));
    }

    #[tokio::test]
    async fn llm_failure_still_answers() {
        let fixture = Fixture::with_listings(Vec::new()).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = chat(&fixture.services(), &turn(&id, "thanks!", &state)).await;
        assert!(outcome.response.message.starts_with("I can help you find a property"));
    }
}
