use tracing::{debug, warn};

use concierge_core::domain::conversation::{PendingAction, PendingActionKind, PendingStatus};
use concierge_core::domain::intent::IntentType;
use concierge_core::domain::listing::Listing;
use concierge_core::ChatResponse;

use super::{HandlerOutcome, HandlerServices, TurnContext};

fn minutes(count: i64) -> String {
    if count == 1 {
        "1 minute".to_string()
    } else {
        format!("{count} minutes")
    }
}

/// Reports on the most recent outreach. Reading state never changes it, so
/// asking twice at the same moment gives the same answer.
pub async fn handle(services: &HandlerServices, turn: &TurnContext<'_>) -> HandlerOutcome {
    let latest = turn
        .pending
        .iter()
        .max_by_key(|action| action.timestamp)
        .or_else(|| turn.state.latest_pending());

    let Some(action) = latest else {
        return HandlerOutcome::reply(
            Some(IntentType::StatusUpdate),
            ChatResponse::text(
                "I haven't contacted any agents for you yet. Pick a listing and say \
                 \"contact listing 12\" and I'll reach out.",
                turn.language,
            ),
        );
    };

    let listing = match services.listings.find_by_id(action.listing_id).await {
        Ok(listing) => listing,
        Err(error) => {
            warn!(
                event_name = "status.listing_lookup_failed",
                listing_id = %action.listing_id,
                error = %error,
            );
            None
        }
    };
    let title = listing
        .as_ref()
        .map(Listing::title)
        .unwrap_or_else(|| format!("listing {}", action.listing_id));

    debug!(
        event_name = "status.reported",
        conversation_id = %turn.conversation_id,
        listing_id = %action.listing_id,
        status = action.status.as_str(),
    );

    let response = match action.status {
        PendingStatus::Completed => {
            let message = match action.kind {
                PendingActionKind::OutreachPictures => {
                    format!("Good news! The agent sent new photos for {title}.")
                }
                PendingActionKind::OutreachAvailability => {
                    format!("Good news! The agent replied about {title}.")
                }
            };
            ChatResponse::text(message, turn.language)
                .with_recommendations(listing.iter().map(Listing::to_card).collect())
                .with_pending_status(PendingStatus::Completed)
        }
        PendingStatus::Waiting => {
            let elapsed = minutes(action.elapsed_minutes(services.clock.now()));
            let waiting_for = match action.kind {
                PendingActionKind::OutreachPictures => "new photos",
                PendingActionKind::OutreachAvailability => "an answer about availability",
            };
            ChatResponse::text(
                format!(
                    "I contacted the agent for {title} {elapsed} ago and I'm still waiting for \
                     {waiting_for}. I'll let you know as soon as they reply."
                ),
                turn.language,
            )
            .with_pending_status(PendingStatus::Waiting)
        }
        PendingStatus::Failed => ChatResponse::text(
            format!("Unfortunately I couldn't reach the agent for {title}. Want me to try again?"),
            turn.language,
        )
        .with_pending_status(PendingStatus::Failed),
    };

    let mut outcome = HandlerOutcome::reply(Some(IntentType::StatusUpdate), response);
    if action.status == PendingStatus::Completed {
        outcome.pending_updates = vec![completed(action)];
    }
    outcome
}

fn completed(action: &PendingAction) -> PendingAction {
    PendingAction { status: PendingStatus::Completed, ..action.clone() }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use concierge_core::domain::conversation::{
        ConversationId, ConversationState, PendingAction, PendingActionKind, PendingStatus,
    };
    use concierge_core::domain::listing::ListingId;
    use concierge_core::Language;

    use super::handle;
    use crate::handlers::TurnContext;
    use crate::heuristics::HeuristicSignals;
    use crate::test_support::{reachable_listing, t0, Fixture};

    fn turn<'a>(
        id: &'a ConversationId,
        state: &'a ConversationState,
        pending: &'a [PendingAction],
    ) -> TurnContext<'a> {
        TurnContext {
            conversation_id: id,
            text: "any update?",
            language: Language::En,
            state,
            pending,
            signals: HeuristicSignals::classify("any update?"),
            history_summary: "",
            refinement: false,
        }
    }

    #[tokio::test]
    async fn waiting_reports_elapsed_minutes_and_is_idempotent() {
        let fixture = Fixture::with_listings(vec![reachable_listing(5, "Girne", 2)]).await;
        fixture.clock.advance(Duration::minutes(45));
        let id = ConversationId::from("c1");
        let state = ConversationState::default();
        let pending =
            [PendingAction::waiting(PendingActionKind::OutreachPictures, ListingId(5), t0(), 2)];

        let first = handle(&fixture.services(), &turn(&id, &state, &pending)).await;
        let second = handle(&fixture.services(), &turn(&id, &state, &pending)).await;

        assert!(first.response.message.contains("45 minutes"));
        assert!(first.response.message.contains("Flat 5"));
        assert_eq!(first.response.pending_status, Some(PendingStatus::Waiting));
        assert_eq!(first.response, second.response);
        assert!(first.pending_updates.is_empty());
    }

    #[tokio::test]
    async fn completed_action_shows_the_listing() {
        let fixture = Fixture::with_listings(vec![reachable_listing(5, "Girne", 4)]).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();
        let mut action =
            PendingAction::waiting(PendingActionKind::OutreachPictures, ListingId(5), t0(), 2);
        action.status = PendingStatus::Completed;
        let pending = [action];

        let outcome = handle(&fixture.services(), &turn(&id, &state, &pending)).await;
        assert!(outcome.response.message.starts_with("Good news!"));
        assert_eq!(outcome.response.recommendations.len(), 1);
        assert_eq!(outcome.response.pending_status, Some(PendingStatus::Completed));
        assert_eq!(outcome.pending_updates[0].status, PendingStatus::Completed);
    }

    #[tokio::test]
    async fn falls_back_to_state_pending_when_tracker_found_nothing() {
        let fixture = Fixture::with_listings(vec![reachable_listing(5, "Girne", 2)]).await;
        fixture.clock.advance(Duration::minutes(1));
        let id = ConversationId::from("c1");
        let state = ConversationState {
            pending_actions: vec![PendingAction::waiting(
                PendingActionKind::OutreachPictures,
                ListingId(5),
                t0(),
                2,
            )],
            ..ConversationState::default()
        };

        let outcome = handle(&fixture.services(), &turn(&id, &state, &[])).await;
        assert!(outcome.response.message.contains("1 minute ago"));
    }

    #[tokio::test]
    async fn nothing_pending_explains_how_to_start() {
        let fixture = Fixture::with_listings(Vec::new()).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = handle(&fixture.services(), &turn(&id, &state, &[])).await;
        assert!(outcome.response.message.starts_with("I haven't contacted any agents"));
        assert_eq!(outcome.response.pending_status, None);
    }
}
