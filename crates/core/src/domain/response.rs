use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::PendingStatus;
use crate::domain::intent::IntentType;
use crate::domain::listing::{ListingId, ListingType};
use crate::language::Language;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCard {
    pub id: ListingId,
    pub title: String,
    pub location: String,
    pub price: Option<Decimal>,
    pub currency: String,
    pub listing_type: ListingType,
    pub bedrooms: Option<u32>,
    pub image_urls: Vec<String>,
    pub verified_with_photos: bool,
}

/// Reply returned to the chat surface for every turn, including failures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub language: Language,
    pub recommendations: Vec<RecommendationCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_status: Option<PendingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

impl ChatResponse {
    pub fn text(message: impl Into<String>, language: Language) -> Self {
        Self {
            message: message.into(),
            language,
            recommendations: Vec::new(),
            pending_status: None,
            intent: None,
            decision: None,
        }
    }

    pub fn with_recommendations(mut self, recommendations: Vec<RecommendationCard>) -> Self {
        self.recommendations = recommendations;
        self
    }

    pub fn with_pending_status(mut self, status: PendingStatus) -> Self {
        self.pending_status = Some(status);
        self
    }

    pub fn with_intent(mut self, intent: IntentType) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_decision(mut self, decision: impl Into<String>) -> Self {
        self.decision = Some(decision.into());
        self
    }

    /// Last-resort reply when something in the turn failed unexpectedly.
    pub fn apology(language: Language) -> Self {
        Self::text(
            "Sorry, I'm having trouble right now. Please try again in a moment.",
            language,
        )
    }
}
