use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use concierge_core::config::{AppConfig, RoutingConfig};
use concierge_core::domain::conversation::{
    ConversationId, ConversationState, PendingAction,
};
use concierge_core::domain::intent::{AgentDomain, IntentResult, IntentType};
use concierge_core::domain::message::{MessageContext, MessageRole, StoredMessage};
use concierge_core::language::detect_language;
use concierge_core::{ChatResponse, Clock, Language};
use concierge_db::conversation::{ConversationStore, ConversationStoreError};
use concierge_db::repositories::MessageRepository;

use crate::continuity::{ContinuityDecision, ContinuityOutcome, ContinuityPolicy};
use crate::conversation::history_summary;
use crate::dispatcher::{Action, Dispatcher};
use crate::handlers::{HandlerOutcome, HandlerServices, OutreachResult, TurnContext};
use crate::heuristics::HeuristicSignals;
use crate::intent_parser::{IntentParser, IntentParserInput};
use crate::pending::PendingActionTracker;
use crate::resolver::{IntentResolver, ResolverInput, ResolverRule};

/// Knobs the runtime reads from [`AppConfig`].
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub routing: RoutingConfig,
    pub history_turns: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { routing: RoutingConfig::default(), history_turns: 6 }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            routing: config.routing.clone(),
            history_turns: config.conversation.history_summary_turns,
        }
    }
}

/// Everything decided while handling one turn, for logs and the `route` command.
#[derive(Clone, Debug, Serialize)]
pub struct TurnTrace {
    pub correlation_id: String,
    pub llm_intent: IntentResult,
    pub resolver_rule: &'static str,
    pub resolved_intent: IntentType,
    pub decision: String,
    pub action: &'static str,
    pub active_domain: Option<AgentDomain>,
    pub state_version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outreach: Option<OutreachResult>,
    pub response: ChatResponse,
}

/// Turn orchestration: classify, resolve, apply hysteresis, dispatch, persist.
pub struct AgentRuntime {
    store: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageRepository>,
    tracker: PendingActionTracker,
    parser: IntentParser,
    resolver: IntentResolver,
    continuity: ContinuityPolicy,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    history_turns: usize,
}

impl AgentRuntime {
    pub fn new(
        services: HandlerServices,
        store: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageRepository>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            store,
            tracker: PendingActionTracker::new(messages.clone(), services.listings.clone()),
            messages,
            parser: IntentParser::new(services.llm.clone()),
            resolver: IntentResolver::new(&settings.routing),
            continuity: ContinuityPolicy::new(&settings.routing),
            clock: services.clock.clone(),
            dispatcher: Dispatcher::new(services),
            history_turns: settings.history_turns,
        }
    }

    /// Handles one user message. Never fails; internal errors surface as a
    /// polite reply and a `warn!` event.
    pub async fn handle_turn(
        &self,
        conversation_id: &ConversationId,
        message: &str,
    ) -> ChatResponse {
        self.route(conversation_id, message).await.response
    }

    pub async fn route(&self, conversation_id: &ConversationId, message: &str) -> TurnTrace {
        let correlation_id = Uuid::new_v4().to_string();
        let text = message.trim();
        let now = self.clock.now();

        let state = match self.store.load(conversation_id).await {
            Ok(state) => state,
            Err(error) => {
                warn!(
                    event_name = "turn.state_load_failed",
                    correlation_id = %correlation_id,
                    conversation_id = %conversation_id,
                    error = %error,
                );
                ConversationState::default()
            }
        };
        let language = detect_language(text).unwrap_or(state.language);

        let history = match self.messages.recent(conversation_id, self.history_turns).await {
            Ok(messages) => history_summary(&messages, self.history_turns),
            Err(error) => {
                warn!(
                    event_name = "turn.history_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                );
                String::new()
            }
        };
        self.append(StoredMessage::new(
            conversation_id.clone(),
            MessageRole::User,
            text,
            MessageContext { language: Some(language), ..MessageContext::default() },
            now,
        ))
        .await;

        let pending = self.current_pending(conversation_id, &state).await;
        let signals = HeuristicSignals::classify(text);

        let llm_intent = self
            .parser
            .parse(&IntentParserInput {
                message: text,
                history_summary: &history,
                language,
                pending_actions: &pending,
            })
            .await;
        let resolution =
            self.resolver.resolve(&ResolverInput { llm: &llm_intent, signals: &signals });
        let continuity = self.continuity.decide(&state, text, &resolution.intent);
        // An explicit "contact listing N" outranks topic stickiness.
        let pinned = resolution.rule == ResolverRule::PinnedListingContact;

        debug!(
            event_name = "turn.routed",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            llm_intent = llm_intent.intent_type.as_str(),
            llm_confidence = llm_intent.confidence,
            rule = resolution.rule.as_str(),
            decision = %continuity.describe(),
            effective_intent = continuity.effective_intent.as_str(),
        );

        let turn = TurnContext {
            conversation_id,
            text,
            language,
            state: &state,
            pending: &pending,
            signals,
            history_summary: &history,
            refinement: continuity.decision == ContinuityDecision::Stick,
        };
        let action = match (&continuity.clarification, continuity.decision) {
            _ if pinned => self.dispatcher.plan(IntentType::AgentOutreach, &turn).await,
            (Some(question), ContinuityDecision::Clarify) => {
                Action::Clarify { question: question.clone() }
            }
            _ => self.dispatcher.plan(continuity.effective_intent, &turn).await,
        };
        let action_name = action.name();
        let outcome = self.dispatcher.dispatch(action, &turn).await;

        let mut next = state.clone();
        apply_outcome(&mut next, &outcome, &continuity, &resolution.intent, language, now);
        let (saved, state_version) = self.persist(conversation_id, next, &correlation_id).await;

        let executed = outcome.intent.unwrap_or(continuity.effective_intent);
        let decision = continuity.describe();
        let mut response =
            outcome.response.clone().with_intent(executed).with_decision(decision.clone());
        response.language = language;

        self.append(StoredMessage::new(
            conversation_id.clone(),
            MessageRole::Assistant,
            response.message.clone(),
            MessageContext {
                pending_actions: saved.pending_actions.clone(),
                recommendations: response.recommendations.iter().map(|card| card.id).collect(),
                intent: Some(executed),
                language: Some(language),
                decision: Some(decision.clone()),
            },
            self.clock.now(),
        ))
        .await;

        info!(
            event_name = "turn.completed",
            correlation_id = %correlation_id,
            conversation_id = %conversation_id,
            rule = resolution.rule.as_str(),
            decision = %decision,
            action = action_name,
            intent = executed.as_str(),
            cards = response.recommendations.len(),
        );

        TurnTrace {
            correlation_id,
            llm_intent,
            resolver_rule: resolution.rule.as_str(),
            resolved_intent: resolution.intent.intent_type,
            decision,
            action: action_name,
            active_domain: saved.active_domain,
            state_version,
            outreach: outcome.outreach,
            response,
        }
    }

    /// Pending actions as of this turn: the tracker's view of the message log,
    /// or the stored state's list refreshed the same way when the log has none.
    async fn current_pending(
        &self,
        conversation_id: &ConversationId,
        state: &ConversationState,
    ) -> Vec<PendingAction> {
        match self.tracker.extract_pending_actions(conversation_id).await {
            Ok(actions) if !actions.is_empty() => return actions,
            Ok(_) => {}
            Err(error) => {
                warn!(
                    event_name = "turn.pending_lookup_failed",
                    conversation_id = %conversation_id,
                    error = %error,
                );
                return state.pending_actions.clone();
            }
        }

        let mut actions = state.pending_actions.clone();
        for action in &mut actions {
            if let Err(error) = self.tracker.refresh(action).await {
                warn!(event_name = "turn.pending_refresh_failed", error = %error);
            }
        }
        actions
    }

    /// Saves `ours`; on a version conflict, reloads, folds in pending actions
    /// another writer appended and saves once more. Returns the state that was
    /// (or would have been) written.
    async fn persist(
        &self,
        conversation_id: &ConversationId,
        ours: ConversationState,
        correlation_id: &str,
    ) -> (ConversationState, Option<u64>) {
        match self.store.save(conversation_id, &ours).await {
            Ok(version) => return (ours, Some(version)),
            Err(ConversationStoreError::VersionConflict { expected, actual, .. }) => {
                info!(
                    event_name = "turn.state_conflict",
                    correlation_id = %correlation_id,
                    conversation_id = %conversation_id,
                    expected,
                    actual,
                );
            }
            Err(error) => {
                warn!(
                    event_name = "turn.state_save_failed",
                    correlation_id = %correlation_id,
                    conversation_id = %conversation_id,
                    error = %error,
                );
                return (ours, None);
            }
        }

        let latest = match self.store.load(conversation_id).await {
            Ok(latest) => latest,
            Err(error) => {
                warn!(
                    event_name = "turn.state_reload_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                );
                return (ours, None);
            }
        };
        let mut merged = ours;
        merged.version = latest.version;
        merged.absorb_pending_from(&latest);

        match self.store.save(conversation_id, &merged).await {
            Ok(version) => (merged, Some(version)),
            Err(error) => {
                warn!(
                    event_name = "turn.state_save_failed",
                    correlation_id = %correlation_id,
                    conversation_id = %conversation_id,
                    error = %error,
                    "giving up after one retry"
                );
                (merged, None)
            }
        }
    }

    async fn append(&self, message: StoredMessage) {
        if let Err(error) = self.messages.append(message).await {
            warn!(event_name = "turn.message_append_failed", error = %error);
        }
    }
}

/// Folds a handler's outcome into the conversation state.
fn apply_outcome(
    state: &mut ConversationState,
    outcome: &HandlerOutcome,
    continuity: &ContinuityOutcome,
    resolved: &IntentResult,
    language: Language,
    now: chrono::DateTime<chrono::Utc>,
) {
    state.language = language;

    let executed_domain = outcome.intent.map(|intent| intent.domain());
    state.active_domain = match continuity.decision {
        ContinuityDecision::Switch => Some(executed_domain.unwrap_or(continuity.domain)),
        ContinuityDecision::Stick => match executed_domain {
            Some(domain) if domain != AgentDomain::General => Some(domain),
            _ => Some(continuity.domain),
        },
        ContinuityDecision::Clarify => state.active_domain,
    };

    if let Some(intent) = outcome.intent {
        state.last_intent = Some(intent);
        state.last_intent_confidence = Some(resolved.confidence);
    }
    if let Some(recommendations) = &outcome.recommendations {
        state.last_recommendations = recommendations.clone();
    }
    if let Some(requirements) = &outcome.requirements {
        state.last_requirements = Some(requirements.clone());
    }
    for update in &outcome.pending_updates {
        if let Some(existing) =
            state.pending_actions.iter_mut().find(|existing| existing.same_action(update))
        {
            existing.status = update.status;
        }
    }
    if let Some(pending) = &outcome.new_pending {
        state.pending_actions.push(pending.clone());
    }
    state.updated_at = Some(now);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use concierge_core::domain::conversation::{
        ConversationId, ConversationState, PendingAction, PendingActionKind, PendingStatus,
    };
    use concierge_core::domain::intent::{AgentDomain, IntentType};
    use concierge_core::domain::listing::ListingId;
    use concierge_core::Clock;
    use concierge_db::conversation::{
        ConversationStore, ConversationStoreError, InMemoryConversationStore,
    };
    use concierge_db::repositories::{
        InMemoryMessageRepository, ListingRepository, MessageRepository,
    };

    use super::{AgentRuntime, RuntimeSettings};
    use crate::llm::ScriptedLlmClient;
    use crate::test_support::{reachable_listing, Fixture};

    struct Harness {
        fixture: Fixture,
        store: Arc<dyn ConversationStore>,
        messages: Arc<InMemoryMessageRepository>,
        runtime: AgentRuntime,
    }

    fn harness_with_store(fixture: Fixture, store: Arc<dyn ConversationStore>) -> Harness {
        let messages = Arc::new(InMemoryMessageRepository::default());
        let runtime = AgentRuntime::new(
            fixture.services(),
            store.clone(),
            messages.clone(),
            RuntimeSettings::default(),
        );
        Harness { fixture, store, messages, runtime }
    }

    fn harness(fixture: Fixture) -> Harness {
        let clock = fixture.clock.clone() as Arc<dyn Clock>;
        let store = Arc::new(InMemoryConversationStore::default().with_clock(clock));
        harness_with_store(fixture, store)
    }

    async fn state(harness: &Harness, id: &ConversationId) -> ConversationState {
        harness.store.load(id).await.expect("load state")
    }

    #[tokio::test]
    async fn contact_listing_is_honoured_even_against_a_confident_llm() {
        let llm = ScriptedLlmClient::new([Ok(
            r#"{"intent_type": "knowledge_query", "confidence": 0.99, "needs_tool": true,
                "tool_name": "search_knowledge_base"}"#
                .to_string(),
        )]);
        let fixture = Fixture::with_listings(vec![reachable_listing(5, "Girne", 2)])
            .await
            .with_llm(Arc::new(llm));
        let harness = harness(fixture);
        let id = ConversationId::from("c1");

        let trace = harness.runtime.route(&id, "contact listing 5").await;
        assert_eq!(trace.resolver_rule, "pinned_listing_contact");
        assert_eq!(trace.response.intent, Some(IntentType::AgentOutreach));
        assert_eq!(trace.response.pending_status, Some(PendingStatus::Waiting));
        assert!(trace.outreach.expect("outreach").ok);

        let saved = state(&harness, &id).await;
        assert_eq!(saved.pending_actions.len(), 1);
        assert_eq!(saved.pending_actions[0].kind, PendingActionKind::OutreachPictures);
        assert_eq!(saved.pending_actions[0].status, PendingStatus::Waiting);

        let logged = harness.messages.latest_assistant(&id).await.expect("log").expect("message");
        assert_eq!(logged.context.pending_actions, saved.pending_actions);
    }

    #[tokio::test]
    async fn short_reply_after_a_search_sticks_to_real_estate() {
        let fixture = Fixture::with_listings(vec![reachable_listing(1, "Girne", 0)]).await;
        let harness = harness(fixture);
        let id = ConversationId::from("c1");

        harness.runtime.route(&id, "2 bedroom apartment in Girne").await;
        assert_eq!(state(&harness, &id).await.active_domain, Some(AgentDomain::RealEstate));

        let trace = harness.runtime.route(&id, "ok thanks").await;
        assert_eq!(trace.decision, "stick:short_input");
        assert_eq!(state(&harness, &id).await.active_domain, Some(AgentDomain::RealEstate));
    }

    #[tokio::test]
    async fn empty_database_search_explains_and_returns_no_cards() {
        let harness = harness(Fixture::with_listings(Vec::new()).await);
        let id = ConversationId::from("c1");

        let response =
            harness.runtime.handle_turn(&id, "2 bedroom apartment in Girne under 500").await;
        assert!(response
            .message
            .starts_with("I couldn't find properties matching your request"));
        assert!(response.recommendations.is_empty());
        assert_eq!(response.intent, Some(IntentType::PropertySearch));
    }

    #[tokio::test]
    async fn status_question_with_nothing_pending_reaches_the_status_handler() {
        let harness = harness(Fixture::with_listings(Vec::new()).await);
        let id = ConversationId::from("c1");

        let trace = harness.runtime.route(&id, "any update?").await;
        assert_eq!(trace.resolver_rule, "status_or_photos");
        assert_eq!(trace.resolved_intent, IntentType::StatusUpdate);
        assert_eq!(trace.action, "status_check");
        assert!(trace.response.message.starts_with("I haven't contacted any agents"));
    }

    #[tokio::test]
    async fn status_after_45_minutes_is_waiting_and_stable() {
        let harness = harness(Fixture::with_listings(vec![reachable_listing(5, "Girne", 2)]).await);
        let id = ConversationId::from("c1");

        harness.runtime.handle_turn(&id, "contact listing 5").await;
        harness.fixture.clock.advance(Duration::minutes(45));

        let first = harness.runtime.handle_turn(&id, "any update on the photos?").await;
        let second = harness.runtime.handle_turn(&id, "any update on the photos?").await;
        assert!(first.message.contains("45 minutes"), "{}", first.message);
        assert_eq!(first.pending_status, Some(PendingStatus::Waiting));
        assert_eq!(first.message, second.message);
        assert_eq!(first.pending_status, second.pending_status);
    }

    #[tokio::test]
    async fn new_photos_complete_the_wait() {
        let harness = harness(Fixture::with_listings(vec![reachable_listing(5, "Girne", 2)]).await);
        let id = ConversationId::from("c1");

        harness.runtime.handle_turn(&id, "contact listing 5").await;
        harness.fixture.listings.save(reachable_listing(5, "Girne", 4)).await.expect("update");

        let response = harness.runtime.handle_turn(&id, "any update on the photos?").await;
        assert!(response.message.starts_with("Good news!"));
        assert_eq!(response.pending_status, Some(PendingStatus::Completed));
        assert_eq!(state(&harness, &id).await.pending_actions[0].status, PendingStatus::Completed);
    }

    #[tokio::test]
    async fn explicit_switch_marker_leaves_real_estate() {
        let harness = harness(Fixture::with_listings(Vec::new()).await);
        let id = ConversationId::from("c1");
        harness
            .store
            .save(
                &id,
                &ConversationState {
                    active_domain: Some(AgentDomain::RealEstate),
                    last_intent: Some(IntentType::PropertySearch),
                    ..ConversationState::default()
                },
            )
            .await
            .expect("seed state");

        let trace = harness.runtime.route(&id, "actually show me cars").await;
        assert!(trace.decision.contains("explicit_switch_marker"), "{}", trace.decision);
    }

    /// Lets another writer append a pending action right before our first save.
    struct RacingStore {
        inner: InMemoryConversationStore,
        raced: AtomicBool,
    }

    #[async_trait]
    impl ConversationStore for RacingStore {
        async fn load(
            &self,
            id: &ConversationId,
        ) -> Result<ConversationState, ConversationStoreError> {
            self.inner.load(id).await
        }

        async fn save(
            &self,
            id: &ConversationId,
            state: &ConversationState,
        ) -> Result<u64, ConversationStoreError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                let mut other = self.inner.load(id).await?;
                other.pending_actions.push(PendingAction::waiting(
                    PendingActionKind::OutreachAvailability,
                    ListingId(77),
                    Utc::now() - Duration::minutes(1),
                    0,
                ));
                self.inner.save(id, &other).await?;
            }
            self.inner.save(id, state).await
        }
    }

    #[tokio::test]
    async fn version_conflict_keeps_both_writers_pending_actions() {
        let store = Arc::new(RacingStore {
            inner: InMemoryConversationStore::default(),
            raced: AtomicBool::new(false),
        });
        let harness = harness_with_store(
            Fixture::with_listings(vec![reachable_listing(5, "Girne", 0)]).await,
            store,
        );
        let id = ConversationId::from("c1");

        let trace = harness.runtime.route(&id, "contact listing 5").await;
        assert_eq!(trace.state_version, Some(2));

        let saved = state(&harness, &id).await;
        let listings: Vec<ListingId> =
            saved.pending_actions.iter().map(|action| action.listing_id).collect();
        assert!(listings.contains(&ListingId(5)));
        assert!(listings.contains(&ListingId(77)));
        assert_eq!(saved.active_domain, Some(AgentDomain::RealEstate));
    }
}
