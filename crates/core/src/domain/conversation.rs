use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::intent::{AgentDomain, IntentType};
use crate::domain::listing::ListingId;
use crate::domain::requirements::SearchRequirements;
use crate::language::Language;

pub const BASELINE_IMAGE_COUNT: &str = "baseline_image_count";
pub const OUTREACH_MESSAGE_ID: &str = "outreach_message_id";
pub const BASELINE_VERIFIED_WITH_PHOTOS: &str = "baseline_verified_with_photos";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionKind {
    OutreachPictures,
    OutreachAvailability,
}

impl PendingActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutreachPictures => "outreach_pictures",
            Self::OutreachAvailability => "outreach_availability",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Waiting,
    Completed,
    Failed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// An outstanding asynchronous wait, e.g. "asked the agent of listing 5 for photos".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    #[serde(rename = "type")]
    pub kind: PendingActionKind,
    pub listing_id: ListingId,
    pub status: PendingStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl PendingAction {
    pub fn waiting(
        kind: PendingActionKind,
        listing_id: ListingId,
        timestamp: DateTime<Utc>,
        baseline_image_count: usize,
    ) -> Self {
        let mut context = Map::new();
        context.insert(BASELINE_IMAGE_COUNT.to_string(), Value::from(baseline_image_count as u64));
        Self { kind, listing_id, status: PendingStatus::Waiting, timestamp, context }
    }

    pub fn baseline_image_count(&self) -> usize {
        self.context
            .get(BASELINE_IMAGE_COUNT)
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .unwrap_or(0)
    }

    pub fn baseline_verified_with_photos(&self) -> bool {
        self.context.get(BASELINE_VERIFIED_WITH_PHOTOS).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_minutes().max(0)
    }

    /// Identity used when merging concurrent appends: same kind, listing and start time.
    pub fn same_action(&self, other: &PendingAction) -> bool {
        self.kind == other.kind
            && self.listing_id == other.listing_id
            && self.timestamp == other.timestamp
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub active_domain: Option<AgentDomain>,
    #[serde(default)]
    pub last_intent: Option<IntentType>,
    #[serde(default)]
    pub last_intent_confidence: Option<f32>,
    #[serde(default)]
    pub last_recommendations: Vec<ListingId>,
    #[serde(default)]
    pub pending_actions: Vec<PendingAction>,
    #[serde(default)]
    pub last_requirements: Option<SearchRequirements>,
    /// Optimistic-concurrency token; bumped by the store on every successful save.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    pub fn latest_pending(&self) -> Option<&PendingAction> {
        self.pending_actions.iter().max_by_key(|action| action.timestamp)
    }

    /// Resolves a 1-based ordinal ("the second one") against the last cards shown.
    pub fn recommendation_at(&self, ordinal: usize) -> Option<ListingId> {
        ordinal.checked_sub(1).and_then(|index| self.last_recommendations.get(index)).copied()
    }

    /// Copies into `self` any pending actions from `other` it does not already hold.
    pub fn absorb_pending_from(&mut self, other: &ConversationState) {
        for action in &other.pending_actions {
            match self.pending_actions.iter_mut().find(|existing| existing.same_action(action)) {
                Some(existing) if action.status != PendingStatus::Waiting => {
                    existing.status = action.status;
                }
                Some(_) => {}
                None => self.pending_actions.push(action.clone()),
            }
        }
        self.pending_actions.sort_by_key(|action| action.timestamp);
    }
}
