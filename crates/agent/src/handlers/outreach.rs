use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};

use concierge_core::domain::conversation::{
    PendingAction, PendingActionKind, PendingStatus, BASELINE_VERIFIED_WITH_PHOTOS,
    OUTREACH_MESSAGE_ID,
};
use concierge_core::domain::intent::IntentType;
use concierge_core::domain::listing::{Listing, ListingId};
use concierge_core::domain::outreach::{OutreachEvent, OutreachStatus};
use concierge_core::domain::requirements::SearchRequirements;
use concierge_core::{ChatResponse, Language, OutboundMessage};
use concierge_db::repositories::RepositoryError;
use concierge_whatsapp::OutreachTemplateContext;

use super::search::listing_query;
use super::{HandlerOutcome, HandlerServices, TurnContext};
use crate::conversation::RequirementExtractor;
use crate::heuristics::asks_about_availability;

const CANDIDATE_LIMIT: usize = 10;
const CLARIFY_LISTED: usize = 5;

/// Which listing the user wants us to contact, as far as the text tells us.
#[derive(Clone, Debug, PartialEq)]
pub enum OutreachTarget {
    Listing(ListingId),
    /// 1-based position in the last recommendations.
    Ordinal(usize),
    /// Described by its attributes ("the 2 bedroom in Alsancak").
    Search(SearchRequirements),
    Unspecified,
}

pub fn plan_target(turn: &TurnContext<'_>, extractor: &RequirementExtractor) -> OutreachTarget {
    if let Some(id) = turn.signals.listing_reference {
        return OutreachTarget::Listing(ListingId(id));
    }
    if let Some(ordinal) = turn.signals.ordinal {
        return OutreachTarget::Ordinal(ordinal);
    }

    let described = extractor.extract(turn.text);
    if !described.is_empty() {
        return OutreachTarget::Search(described);
    }

    match turn.state.last_recommendations.as_slice() {
        [only] => OutreachTarget::Listing(*only),
        _ => OutreachTarget::Unspecified,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachFailure {
    NotFound,
    NoContact,
    SendFailed,
    Error,
}

/// Structured result of an outreach attempt, logged and kept on the outcome.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutreachResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<OutreachFailure>,
    pub listing_id: Option<ListingId>,
    pub message_id: Option<String>,
    /// Events logged for this listing so far, including this one.
    pub outreach_count: Option<usize>,
}

impl OutreachResult {
    fn failed(reason: OutreachFailure, listing_id: Option<ListingId>) -> Self {
        Self { ok: false, reason: Some(reason), listing_id, message_id: None, outreach_count: None }
    }
}

enum Resolved {
    Found(Listing),
    Clarify(String),
    NotFound(Option<ListingId>),
}

async fn resolve_target(
    services: &HandlerServices,
    turn: &TurnContext<'_>,
    target: &OutreachTarget,
) -> Result<Resolved, RepositoryError> {
    let recent = &turn.state.last_recommendations;
    let id = match target {
        OutreachTarget::Listing(id) => *id,
        OutreachTarget::Ordinal(ordinal) => match turn.state.recommendation_at(*ordinal) {
            Some(id) => id,
            None if recent.is_empty() => {
                return Ok(Resolved::Clarify(
                    "I haven't shown you any listings yet. Tell me what you're looking for and \
                     I'll find some options first."
                        .to_string(),
                ));
            }
            None => {
                return Ok(Resolved::Clarify(format!(
                    "I only showed you {} listings. Which one should I contact?",
                    recent.len()
                )));
            }
        },
        OutreachTarget::Search(requirements) => {
            let mut candidates =
                services.listings.search(&listing_query(requirements, CANDIDATE_LIMIT)).await?;
            if candidates.iter().any(|listing| recent.contains(&listing.id)) {
                candidates.retain(|listing| recent.contains(&listing.id));
            }
            return Ok(match candidates.len() {
                0 => Resolved::NotFound(None),
                1 => Resolved::Found(candidates.remove(0)),
                _ => Resolved::Clarify(which_one(&candidates)),
            });
        }
        OutreachTarget::Unspecified => {
            let message = if recent.is_empty() {
                "Which listing should I contact? You can say something like \"contact listing 12\"."
                    .to_string()
            } else {
                let mut shown = Vec::new();
                for id in recent.iter().take(CLARIFY_LISTED) {
                    if let Some(listing) = services.listings.find_by_id(*id).await? {
                        shown.push(listing);
                    }
                }
                which_one(&shown)
            };
            return Ok(Resolved::Clarify(message));
        }
    };

    Ok(match services.listings.find_by_id(id).await? {
        Some(listing) if listing.is_active => Resolved::Found(listing),
        _ => Resolved::NotFound(Some(id)),
    })
}

fn which_one(candidates: &[Listing]) -> String {
    let mut message = String::from("Which listing should I contact?");
    for listing in candidates.iter().take(CLARIFY_LISTED) {
        message.push_str(&format!("\n- {} (listing {})", listing.title(), listing.id));
    }
    message
}

fn failure(
    reason: OutreachFailure,
    listing_id: Option<ListingId>,
    message: String,
    language: Language,
) -> HandlerOutcome {
    let mut outcome = HandlerOutcome::reply(
        Some(IntentType::AgentOutreach),
        ChatResponse::text(message, language).with_pending_status(PendingStatus::Failed),
    );
    outcome.outreach = Some(OutreachResult::failed(reason, listing_id));
    outcome
}

pub async fn handle(
    services: &HandlerServices,
    turn: &TurnContext<'_>,
    target: OutreachTarget,
) -> HandlerOutcome {
    let language = turn.language;
    let listing = match resolve_target(services, turn, &target).await {
        Ok(Resolved::Found(listing)) => listing,
        Ok(Resolved::Clarify(question)) => {
            return HandlerOutcome::reply(
                Some(IntentType::AgentOutreach),
                ChatResponse::text(question, language),
            );
        }
        Ok(Resolved::NotFound(id)) => {
            let message = match id {
                Some(id) => format!("I couldn't find listing {id}. It may have been removed."),
                None => "I couldn't find a listing matching that description.".to_string(),
            };
            return failure(OutreachFailure::NotFound, id, message, language);
        }
        Err(error) => {
            warn!(event_name = "outreach.lookup_failed", error = %error);
            return failure(
                OutreachFailure::Error,
                None,
                "Something went wrong while contacting the agent. Please try again in a moment."
                    .to_string(),
                language,
            );
        }
    };

    let title = listing.title();
    let Some(contact) = listing.contact() else {
        return failure(
            OutreachFailure::NoContact,
            Some(listing.id),
            format!("{title} doesn't have any contact details, so I can't reach the agent."),
            language,
        );
    };

    let kind = if asks_about_availability(turn.text) && !turn.signals.asked_for_photos {
        PendingActionKind::OutreachAvailability
    } else {
        PendingActionKind::OutreachPictures
    };

    let values = OutreachTemplateContext {
        listing_id: listing.id.0,
        listing_title: title.clone(),
        location: Some(listing.location.clone()).filter(|location| !location.trim().is_empty()),
    };
    let text = match services.templates.render(kind, language, &values) {
        Ok(text) => text,
        Err(error) => {
            warn!(event_name = "outreach.template_failed", error = %error);
            return failure(
                OutreachFailure::Error,
                Some(listing.id),
                "Something went wrong while contacting the agent. Please try again in a moment."
                    .to_string(),
                language,
            );
        }
    };

    let now = services.clock.now();
    let sent = services.messaging.send(&OutboundMessage::text(contact.number.clone(), &text)).await;
    let (status, provider_message_id, send_error) = match sent {
        Ok(receipt) if receipt.ok => (OutreachStatus::Sent, receipt.message_id, None),
        Ok(_) => {
            let reason = "provider did not accept the message".to_string();
            (OutreachStatus::Failed, None, Some(reason))
        }
        Err(error) => (OutreachStatus::Failed, None, Some(error.to_string())),
    };

    let event = OutreachEvent {
        id: uuid::Uuid::new_v4().to_string(),
        listing_id: listing.id,
        conversation_id: Some(turn.conversation_id.clone()),
        channel: services.messaging.channel().to_string(),
        to: contact.number,
        text,
        status,
        provider_message_id: provider_message_id.clone(),
        follow_up_at: (status == OutreachStatus::Sent)
            .then(|| now + Duration::minutes(services.follow_up_minutes)),
        created_at: now,
    };
    let event_id = event.id.clone();
    let recorded = services.listings.record_outreach(event).await;

    if let Some(reason) = send_error {
        if let Err(error) = recorded {
            warn!(event_name = "outreach.record_failed", listing_id = %listing.id, error = %error);
        }
        warn!(
            event_name = "outreach.send_failed",
            conversation_id = %turn.conversation_id,
            listing_id = %listing.id,
            reason = %reason,
        );
        return failure(
            OutreachFailure::SendFailed,
            Some(listing.id),
            format!("I couldn't reach the agent for {title} right now. Please try again later."),
            language,
        );
    }

    // The message is already out; a logging failure must not hide that from the user.
    let outreach_count = match recorded {
        Ok(count) => Some(count),
        Err(error) => {
            warn!(event_name = "outreach.record_failed", listing_id = %listing.id, error = %error);
            None
        }
    };

    let message_id = provider_message_id.unwrap_or(event_id);
    let pending = PendingAction::waiting(kind, listing.id, now, listing.image_count())
        .with_context(OUTREACH_MESSAGE_ID, message_id.clone())
        .with_context(BASELINE_VERIFIED_WITH_PHOTOS, listing.structured_data.verified_with_photos);

    info!(
        event_name = "outreach.sent",
        conversation_id = %turn.conversation_id,
        listing_id = %listing.id,
        kind = kind.as_str(),
        channel = services.messaging.channel(),
        outreach_count = outreach_count.unwrap_or_default(),
    );

    let message = match kind {
        PendingActionKind::OutreachPictures => format!(
            "I've contacted the agent for {title} and asked for more photos. I'll let you know as soon as they reply."
        ),
        PendingActionKind::OutreachAvailability => format!(
            "I've contacted the agent for {title} and asked whether it's still available. I'll let you know as soon as they reply."
        ),
    };

    let mut outcome = HandlerOutcome::reply(
        Some(IntentType::AgentOutreach),
        ChatResponse::text(message, language)
            .with_recommendations(vec![listing.to_card()])
            .with_pending_status(PendingStatus::Waiting),
    );
    outcome.new_pending = Some(pending);
    outcome.outreach = Some(OutreachResult {
        ok: true,
        reason: None,
        listing_id: Some(listing.id),
        message_id: Some(message_id),
        outreach_count,
    });
    outcome
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use concierge_core::domain::conversation::{
        ConversationId, ConversationState, PendingActionKind, PendingStatus, OUTREACH_MESSAGE_ID,
    };
    use concierge_core::domain::listing::ListingId;
    use concierge_core::domain::outreach::OutreachStatus;
    use concierge_core::Language;
    use concierge_db::repositories::ListingRepository;

    use super::{handle, plan_target, OutreachFailure, OutreachTarget};
    use crate::conversation::RequirementExtractor;
    use crate::handlers::TurnContext;
    use crate::heuristics::HeuristicSignals;
    use crate::test_support::{listing, reachable_listing, Fixture, RecordingGateway};

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
            history_summary: "",
            refinement: false,
        }
    }

    #[tokio::test]
    async fn contacting_a_listing_sends_records_and_waits() {
        let fixture = Fixture::with_listings(vec![reachable_listing(5, "Girne", 2)]).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = handle(
            &fixture.services(),
            &turn(&id, "contact listing 5", &state),
            OutreachTarget::Listing(ListingId(5)),
        )
        .await;

        let sent = fixture.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+905488639394");
        assert!(sent[0].text.contains("photos"));

        let pending = outcome.new_pending.expect("pending action");
        assert_eq!(pending.kind, PendingActionKind::OutreachPictures);
        assert_eq!(pending.status, PendingStatus::Waiting);
        assert_eq!(pending.baseline_image_count(), 2);
        assert_eq!(pending.context[OUTREACH_MESSAGE_ID], "wamid.1");
        assert_eq!(outcome.response.pending_status, Some(PendingStatus::Waiting));

        let result = outcome.outreach.expect("result");
        assert!(result.ok);
        assert_eq!(result.outreach_count, Some(1));
        let events = fixture.listings.list_outreach(ListingId(5)).await.expect("events");
        assert_eq!(events[0].status, OutreachStatus::Sent);
        assert!(events[0].follow_up_at.is_some());
    }

    #[tokio::test]
    async fn ordinal_resolves_against_last_recommendations() {
        let fixture = Fixture::with_listings(vec![
            reachable_listing(3, "Girne", 0),
            reachable_listing(8, "Girne", 0),
        ])
        .await;
        let id = ConversationId::from("c1");
        let state = ConversationState {
            last_recommendations: vec![ListingId(3), ListingId(8)],
            ..ConversationState::default()
        };
        let turn = turn(&id, "contact the second one", &state);
        assert_eq!(plan_target(&turn, &RequirementExtractor::new()), OutreachTarget::Ordinal(2));

        let outcome = handle(&fixture.services(), &turn, OutreachTarget::Ordinal(2)).await;
        assert_eq!(outcome.new_pending.expect("pending").listing_id, ListingId(8));
    }

    #[tokio::test]
    async fn listing_without_contact_is_not_messaged() {
        let fixture =
            Fixture::with_listings(vec![listing(9, "Girne", json!({"title": "Quiet villa"}))])
                .await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = handle(
            &fixture.services(),
            &turn(&id, "contact listing 9", &state),
            OutreachTarget::Listing(ListingId(9)),
        )
        .await;
        assert!(fixture.gateway.sent().is_empty());
        assert_eq!(outcome.outreach.expect("result").reason, Some(OutreachFailure::NoContact));
        assert!(outcome.new_pending.is_none());
    }

    #[tokio::test]
    async fn gateway_failure_records_a_failed_event_and_no_pending() {
        let fixture = Fixture::with_listings(vec![reachable_listing(5, "Girne", 0)])
            .await
            .with_gateway(RecordingGateway::failing());
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = handle(
            &fixture.services(),
            &turn(&id, "contact listing 5", &state),
            OutreachTarget::Listing(ListingId(5)),
        )
        .await;
        let result = outcome.outreach.expect("result");
        assert!(!result.ok);
        assert_eq!(result.reason, Some(OutreachFailure::SendFailed));
        assert!(outcome.new_pending.is_none());

        let events = fixture.listings.list_outreach(ListingId(5)).await.expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, OutreachStatus::Failed);
        assert!(events[0].follow_up_at.is_none());
    }

    #[tokio::test]
    async fn unknown_listing_is_not_found() {
        let fixture = Fixture::with_listings(Vec::new()).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = handle(
            &fixture.services(),
            &turn(&id, "contact listing 404", &state),
            OutreachTarget::Listing(ListingId(404)),
        )
        .await;
        let result = outcome.outreach.expect("result");
        assert_eq!(result.reason, Some(OutreachFailure::NotFound));
        assert_eq!(serde_json::to_value(&result).expect("encode")["reason"], "not_found");
    }

    #[tokio::test]
    async fn several_candidates_ask_which_one() {
        let fixture = Fixture::with_listings(vec![
            reachable_listing(1, "Girne", 0),
            reachable_listing(2, "Girne", 0),
        ])
        .await;
        let id = ConversationId::from("c1");
        let state = ConversationState {
            last_recommendations: vec![ListingId(1), ListingId(2)],
            ..ConversationState::default()
        };
        let turn = turn(&id, "contact the agent please", &state);
        assert_eq!(plan_target(&turn, &RequirementExtractor::new()), OutreachTarget::Unspecified);

        let outcome = handle(&fixture.services(), &turn, OutreachTarget::Unspecified).await;
        assert!(fixture.gateway.sent().is_empty());
        assert!(outcome.response.message.starts_with("Which listing should I contact?"));
        assert!(outcome.response.message.contains("(listing 2)"));
    }

    #[tokio::test]
    async fn availability_question_uses_the_availability_template() {
        let fixture = Fixture::with_listings(vec![reachable_listing(5, "Girne", 0)]).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();

        let outcome = handle(
            &fixture.services(),
            &turn(&id, "ask the agent of listing 5 if it is still available", &state),
            OutreachTarget::Listing(ListingId(5)),
        )
        .await;
        let pending = outcome.new_pending.expect("pending");
        assert_eq!(pending.kind, PendingActionKind::OutreachAvailability);
        assert!(fixture.gateway.sent()[0].text.contains("still available"));
    }
}
