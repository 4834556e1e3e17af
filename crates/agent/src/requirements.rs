use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use concierge_core::domain::listing::ListingType;
use concierge_core::domain::requirements::{RentalDuration, SearchRequirements};
use concierge_core::location::normalize_location;

use crate::conversation::RequirementExtractor;
use crate::llm::{extract_json_object, ChatMessage, CompletionRequest, LlmClient};

const SYSTEM_PROMPT: &str = "Extract property search filters from the user's message. \
Reply with one JSON object using only these keys, omitting anything not stated:
listing_type (\"rent\" or \"sale\"), property_type (apartment, villa, house, studio, \
penthouse, bungalow, duplex), location (town or area name), bedrooms (integer), \
min_price (number), max_price (number), currency (ISO code), furnished (boolean), \
pets_allowed (boolean), duration (\"short_term\" or \"long_term\"), features (list of strings).
`previous` holds the filters already in use; only repeat them if the user restates them.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequirementsSource {
    Llm,
    Heuristic,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedRequirements {
    pub requirements: SearchRequirements,
    pub source: RequirementsSource,
}

#[derive(Debug, Default, Deserialize)]
struct RequirementsPayload {
    listing_type: Option<String>,
    property_type: Option<String>,
    location: Option<String>,
    bedrooms: Option<u32>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    currency: Option<String>,
    furnished: Option<bool>,
    pets_allowed: Option<bool>,
    duration: Option<String>,
    #[serde(default)]
    features: Vec<String>,
}

impl From<RequirementsPayload> for SearchRequirements {
    fn from(payload: RequirementsPayload) -> Self {
        let non_empty = |value: Option<String>| {
            value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };
        let price = |value: Option<f64>| {
            value.filter(|amount| *amount > 0.0).and_then(|amount| Decimal::try_from(amount).ok())
        };

        Self {
            listing_type: payload.listing_type.as_deref().and_then(ListingType::parse),
            property_type: non_empty(payload.property_type).map(|value| value.to_lowercase()),
            location: non_empty(payload.location).map(|location| {
                normalize_location(&location).map(str::to_string).unwrap_or(location)
            }),
            bedrooms: payload.bedrooms,
            min_price: price(payload.min_price),
            max_price: price(payload.max_price),
            currency: non_empty(payload.currency).map(|code| code.to_uppercase()),
            furnished: payload.furnished,
            pets_allowed: payload.pets_allowed,
            duration: match payload.duration.as_deref() {
                Some("short_term") => Some(RentalDuration::ShortTerm),
                Some("long_term") => Some(RentalDuration::LongTerm),
                _ => None,
            },
            features: payload
                .features
                .into_iter()
                .map(|feature| feature.trim().to_lowercase())
                .filter(|feature| !feature.is_empty())
                .collect(),
        }
    }
}

/// Second LLM call made only for search turns. The keyword extractor fills
/// whatever the model left out, and stands in entirely when the model fails.
pub struct RequirementsParser {
    llm: Arc<dyn LlmClient>,
    heuristic: RequirementExtractor,
}

impl RequirementsParser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, heuristic: RequirementExtractor::new() }
    }

    pub async fn extract(
        &self,
        message: &str,
        previous: Option<&SearchRequirements>,
    ) -> ExtractedRequirements {
        let heuristic = self.heuristic.extract(message);

        let payload = json!({ "message": message, "previous": previous });
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(payload.to_string()),
        ])
        .json()
        .with_temperature(0.0);

        let parsed = match self.llm.complete(&request).await {
            Ok(content) => extract_json_object(&content)
                .ok_or_else(|| "no json object".to_string())
                .and_then(|object| {
                    serde_json::from_str::<RequirementsPayload>(object)
                        .map_err(|e| format!("invalid json: {e}"))
                }),
            Err(error) => Err(error.to_string()),
        };

        match parsed {
            Ok(payload) => {
                let requirements = SearchRequirements::from(payload).merged_over(&heuristic);
                debug!(event_name = "requirements.extracted", source = "llm");
                ExtractedRequirements { requirements, source: RequirementsSource::Llm }
            }
            Err(reason) => {
                warn!(
                    event_name = "requirements.llm_failed",
                    reason = %reason,
                    "falling back to keyword extraction"
                );
                ExtractedRequirements {
                    requirements: heuristic,
                    source: RequirementsSource::Heuristic,
                }
            }
        }
    }
}
