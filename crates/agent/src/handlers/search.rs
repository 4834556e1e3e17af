use rust_decimal::Decimal;
use tracing::{info, warn};

use concierge_core::domain::intent::IntentType;
use concierge_core::domain::listing::{Listing, ListingId};
use concierge_core::domain::requirements::SearchRequirements;
use concierge_core::location::{normalize_location, parent_region, search_terms};
use concierge_core::ChatResponse;
use concierge_db::repositories::{ListingQuery, RepositoryError};

use super::{HandlerOutcome, HandlerServices, TurnContext};
use crate::conversation::{property_type_terms, wants_cheaper};
use crate::requirements::RequirementsParser;

/// "cheaper" keeps 80% of the previous ceiling.
const CHEAPER_FACTOR: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

/// Builds the filters for this turn. Refinements and filter-less follow-ups
/// ("show me the options") inherit whatever the last search used.
pub async fn build_requirements(
    parser: &RequirementsParser,
    turn: &TurnContext<'_>,
) -> SearchRequirements {
    let previous = turn.state.last_requirements.as_ref();
    let extracted = parser.extract(turn.text, previous).await.requirements;
    let stated_ceiling = extracted.max_price;

    let mut requirements = match previous {
        Some(previous) if turn.refinement || extracted.is_empty() => {
            extracted.merged_over(previous)
        }
        _ => extracted,
    };

    if stated_ceiling.is_none() && wants_cheaper(turn.text) {
        if let Some(ceiling) = previous.and_then(|previous| previous.max_price) {
            requirements.max_price = Some((ceiling * CHEAPER_FACTOR).round_dp(2));
        }
    }
    requirements
}

fn query_for(
    requirements: &SearchRequirements,
    location_terms: Vec<String>,
    limit: usize,
) -> ListingQuery {
    ListingQuery {
        listing_type: requirements.listing_type,
        location_terms,
        property_terms: requirements
            .property_type
            .as_deref()
            .map(property_type_terms)
            .unwrap_or_default(),
        bedrooms: requirements.bedrooms,
        min_price: requirements.min_price,
        max_price: requirements.max_price,
        furnished: requirements.furnished,
        pets_allowed: requirements.pets_allowed,
        features: requirements.features.clone(),
        require_contact: true,
        limit,
    }
}

fn canonical_location(requirements: &SearchRequirements) -> Option<String> {
    requirements.location.as_deref().map(|location| {
        normalize_location(location).map(str::to_string).unwrap_or_else(|| location.to_string())
    })
}

/// Query for `requirements` with the location expanded to all its spellings.
pub(crate) fn listing_query(requirements: &SearchRequirements, limit: usize) -> ListingQuery {
    let terms = canonical_location(requirements).as_deref().map(search_terms).unwrap_or_default();
    query_for(requirements, terms, limit)
}

struct SearchResults {
    listings: Vec<Listing>,
    /// Set when the village had nothing and its parent region was searched instead.
    widened_from: Option<String>,
    location: Option<String>,
}

async fn run_search(
    services: &HandlerServices,
    requirements: &SearchRequirements,
) -> Result<SearchResults, RepositoryError> {
    let limit = services.max_search_results.max(1);
    let canonical = canonical_location(requirements);

    let listings = services.listings.search(&listing_query(requirements, limit)).await?;
    if !listings.is_empty() {
        return Ok(SearchResults { listings, widened_from: None, location: canonical });
    }

    // One level up only: village -> region, never region -> island.
    if let Some(parent) = canonical.as_deref().and_then(parent_region) {
        let listings = services
            .listings
            .search(&query_for(requirements, search_terms(parent), limit))
            .await?;
        if !listings.is_empty() {
            return Ok(SearchResults {
                listings,
                widened_from: canonical,
                location: Some(parent.to_string()),
            });
        }
    }

    Ok(SearchResults { listings: Vec::new(), widened_from: None, location: canonical })
}

pub async fn handle(
    services: &HandlerServices,
    turn: &TurnContext<'_>,
    requirements: SearchRequirements,
) -> HandlerOutcome {
    let results = match run_search(services, &requirements).await {
        Ok(results) => results,
        Err(error) => {
            warn!(
                event_name = "search.failed",
                conversation_id = %turn.conversation_id,
                error = %error,
            );
            let mut outcome = HandlerOutcome::reply(
                Some(IntentType::PropertySearch),
                ChatResponse::text(
                    "Sorry, I couldn't search the listings just now. Please try again in a moment.",
                    turn.language,
                ),
            );
            outcome.requirements = Some(requirements);
            return outcome;
        }
    };

    info!(
        event_name = "search.completed",
        conversation_id = %turn.conversation_id,
        results = results.listings.len(),
        location = results.location.as_deref().unwrap_or("anywhere"),
        widened = results.widened_from.is_some(),
    );

    let message = if results.listings.is_empty() {
        "I couldn't find properties matching your request. Try another area or a higher budget."
            .to_string()
    } else {
        found_message(&requirements, &results)
    };

    let ids: Vec<ListingId> = results.listings.iter().map(|listing| listing.id).collect();
    let cards = results.listings.iter().map(Listing::to_card).collect();

    let mut outcome = HandlerOutcome::reply(
        Some(IntentType::PropertySearch),
        ChatResponse::text(message, turn.language).with_recommendations(cards),
    );
    outcome.recommendations = Some(ids);
    outcome.requirements = Some(requirements);
    outcome
}

fn found_message(requirements: &SearchRequirements, results: &SearchResults) -> String {
    let count = results.listings.len();
    let noun = if count == 1 { "property" } else { "properties" };

    if let (Some(village), Some(region)) = (&results.widened_from, &results.location) {
        return format!(
            "I couldn't find anything in {village}, but here {} {count} {noun} in {region}:",
            if count == 1 { "is" } else { "are" },
        );
    }

    let summary = requirements.summary();
    if summary.is_empty() {
        format!("I found {count} {noun} for you:")
    } else {
        format!("I found {count} {noun} matching {summary}:")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use serde_json::json;

    use concierge_core::domain::conversation::{ConversationId, ConversationState};
    use concierge_core::domain::listing::ListingId;
    use concierge_core::domain::requirements::SearchRequirements;
    use concierge_core::Language;

    use super::{build_requirements, handle};
    use crate::handlers::TurnContext;
    use crate::heuristics::HeuristicSignals;
    use crate::llm::{DisabledLlmClient, LlmError, ScriptedLlmClient};
    use crate::requirements::RequirementsParser;
    use crate::test_support::{listing, reachable_listing, Fixture};

    fn turn<'a>(
        id: &'a ConversationId,
        text: &'a str,
        state: &'a ConversationState,
        refinement: bool,
    ) -> TurnContext<'a> {
        TurnContext {
            conversation_id: id,
            text,
            language: Language::En,
            state,
            pending: &[],
            signals: HeuristicSignals::classify(text),
            history_summary: "",
            refinement,
        }
    }

    #[tokio::test]
    async fn results_become_cards_and_recommendations() {
        let fixture = Fixture::with_listings(vec![
            reachable_listing(1, "Girne", 0),
            reachable_listing(2, "Lefke", 0),
        ])
        .await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();
        let requirements = SearchRequirements {
            location: Some("Kyrenia".to_string()),
            bedrooms: Some(2),
            ..SearchRequirements::default()
        };

        let outcome =
            handle(&fixture.services(), &turn(&id, "2+1 in Kyrenia", &state, false), requirements)
                .await;
        assert_eq!(outcome.recommendations, Some(vec![ListingId(1)]));
        assert_eq!(outcome.response.recommendations.len(), 1);
        assert!(outcome.response.message.starts_with("I found 1 property matching"));
    }

    #[tokio::test]
    async fn property_type_filters_out_other_kinds() {
        let contact = json!({"whatsapp": "+905488639394"});
        let fixture = Fixture::with_listings(vec![
            reachable_listing(1, "Girne", 0),
            listing(2, "Girne", json!({"title": "Stone villa", "contact_info": contact})),
            listing(
                3,
                "Girne",
                json!({"title": "Family home", "property_type": "Villa", "contact_info": contact}),
            ),
            listing(
                4,
                "Girne",
                json!({
                    "title": "Villa-view flat",
                    "property_type": "apartment",
                    "contact_info": contact,
                }),
            ),
        ])
        .await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();
        let requirements = SearchRequirements {
            location: Some("Girne".to_string()),
            property_type: Some("villa".to_string()),
            ..SearchRequirements::default()
        };

        let outcome = handle(
            &fixture.services(),
            &turn(&id, "looking for a villa in Girne", &state, false),
            requirements,
        )
        .await;
        let mut ids = outcome.recommendations.expect("recommendations");
        ids.sort_by_key(|id| id.0);
        assert_eq!(ids, vec![ListingId(2), ListingId(3)]);
        assert!(outcome.response.message.starts_with("I found 2 properties matching villa"));
    }

    #[tokio::test]
    async fn apartment_search_also_finds_flats() {
        let fixture = Fixture::with_listings(vec![reachable_listing(1, "Girne", 0)]).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();
        let requirements = SearchRequirements {
            property_type: Some("apartment".to_string()),
            ..SearchRequirements::default()
        };

        let outcome =
            handle(&fixture.services(), &turn(&id, "an apartment", &state, false), requirements)
                .await;
        assert_eq!(outcome.recommendations, Some(vec![ListingId(1)]));
    }

    #[tokio::test]
    async fn empty_village_widens_to_its_region_once() {
        let fixture = Fixture::with_listings(vec![reachable_listing(1, "Girne", 0)]).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();
        let requirements =
            SearchRequirements { location: Some("Alsancak".to_string()), ..Default::default() };

        let outcome =
            handle(&fixture.services(), &turn(&id, "in Alsancak", &state, false), requirements)
                .await;
        assert_eq!(outcome.recommendations, Some(vec![ListingId(1)]));
        assert!(outcome.response.message.contains("in Girne"));
    }

    #[tokio::test]
    async fn nothing_found_returns_no_cards() {
        let fixture = Fixture::with_listings(vec![reachable_listing(1, "Girne", 0)]).await;
        let id = ConversationId::from("c1");
        let state = ConversationState::default();
        let requirements =
            SearchRequirements { location: Some("Lefke".to_string()), ..Default::default() };

        let outcome =
            handle(&fixture.services(), &turn(&id, "in Lefke", &state, false), requirements).await;
        assert!(outcome.response.recommendations.is_empty());
        assert_eq!(outcome.recommendations, Some(Vec::new()));
        assert!(outcome.response.message.starts_with("I couldn't find properties"));
    }

    #[tokio::test]
    async fn cheaper_cuts_the_previous_ceiling() {
        let parser = RequirementsParser::new(Arc::new(ScriptedLlmClient::new([Err(
            LlmError::Disabled,
        )])));
        let id = ConversationId::from("c1");
        let state = ConversationState {
            last_requirements: Some(SearchRequirements {
                location: Some("Girne".to_string()),
                max_price: Some(Decimal::from(500)),
                ..Default::default()
            }),
            ..ConversationState::default()
        };

        let requirements =
            build_requirements(&parser, &turn(&id, "something cheaper", &state, true)).await;
        assert_eq!(requirements.max_price, Some(Decimal::from(400)));
        assert_eq!(requirements.location.as_deref(), Some("Girne"));
    }

    #[tokio::test]
    async fn a_fresh_search_does_not_inherit_old_filters() {
        let parser = RequirementsParser::new(Arc::new(DisabledLlmClient));
        let id = ConversationId::from("c1");
        let state = ConversationState {
            last_requirements: Some(SearchRequirements {
                location: Some("Girne".to_string()),
                bedrooms: Some(3),
                ..Default::default()
            }),
            ..ConversationState::default()
        };

        let requirements =
            build_requirements(&parser, &turn(&id, "villa in Iskele", &state, false)).await;
        assert_eq!(requirements.location.as_deref(), Some("Iskele"));
        assert_eq!(requirements.bedrooms, None);
    }
}
