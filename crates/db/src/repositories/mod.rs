use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use concierge_core::domain::conversation::ConversationId;
use concierge_core::domain::knowledge::KnowledgeArticle;
use concierge_core::domain::listing::{Listing, ListingId, ListingType};
use concierge_core::domain::message::StoredMessage;
use concierge_core::domain::outreach::OutreachEvent;

pub mod knowledge;
pub mod listing;
pub mod memory;
pub mod message;

pub use knowledge::SqlKnowledgeRepository;
pub use listing::SqlListingRepository;
pub use memory::{
    InMemoryKnowledgeRepository, InMemoryListingRepository, InMemoryMessageRepository,
};
pub use message::SqlMessageRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("listing {0} was not found or is inactive")]
    ListingNotFound(ListingId),
}

/// Filters for a listing search. Location matching is by substring against
/// any of `location_terms`; an empty list means "anywhere". `property_terms`
/// works the same way against the listing's property type and text.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingQuery {
    pub listing_type: Option<ListingType>,
    pub location_terms: Vec<String>,
    pub property_terms: Vec<String>,
    pub bedrooms: Option<u32>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub furnished: Option<bool>,
    pub pets_allowed: Option<bool>,
    pub features: Vec<String>,
    pub require_contact: bool,
    pub limit: usize,
}

impl Default for ListingQuery {
    fn default() -> Self {
        Self {
            listing_type: None,
            location_terms: Vec::new(),
            property_terms: Vec::new(),
            bedrooms: None,
            min_price: None,
            max_price: None,
            furnished: None,
            pets_allowed: None,
            features: Vec::new(),
            require_contact: true,
            limit: 25,
        }
    }
}

impl ListingQuery {
    /// Filters that cannot be pushed into SQL because they live in the JSON blob
    /// or need the contact extractor.
    pub fn matches_structured(&self, listing: &Listing) -> bool {
        let data = &listing.structured_data;
        if let Some(bedrooms) = self.bedrooms {
            if data.bedrooms != Some(bedrooms) {
                return false;
            }
        }
        if self.furnished == Some(true) && data.furnished == Some(false) {
            return false;
        }
        if self.pets_allowed == Some(true) && data.pets_allowed == Some(false) {
            return false;
        }
        if !self.property_terms.is_empty() || !self.features.is_empty() {
            let text = listing.searchable_text();
            if !self.matches_property_type(data.property_type.as_deref(), &text) {
                return false;
            }
            if !self.features.iter().all(|feature| text.contains(&feature.to_lowercase())) {
                return false;
            }
        }
        if self.require_contact && !listing.has_contact_info() {
            return false;
        }
        true
    }

    /// A declared `property_type` decides on its own; untyped listings fall
    /// back to their title and description text.
    fn matches_property_type(&self, declared: Option<&str>, text: &str) -> bool {
        if self.property_terms.is_empty() {
            return true;
        }
        let terms = self.property_terms.iter().map(|term| term.to_lowercase());
        match declared.map(str::trim).filter(|declared| !declared.is_empty()) {
            Some(declared) => {
                let declared = declared.to_lowercase();
                terms.into_iter().any(|term| declared.contains(&term))
            }
            None => terms.into_iter().any(|term| text.contains(&term)),
        }
    }

    pub fn matches_columns(&self, listing: &Listing) -> bool {
        if !listing.is_active {
            return false;
        }
        if let Some(listing_type) = self.listing_type {
            if listing.listing_type != listing_type {
                return false;
            }
        }
        if !self.location_terms.is_empty() {
            let location = listing.location.to_lowercase();
            if !self.location_terms.iter().any(|term| location.contains(&term.to_lowercase())) {
                return false;
            }
        }
        if let Some(max_price) = self.max_price {
            if listing.price.is_some_and(|price| price > max_price) {
                return false;
            }
        }
        if let Some(min_price) = self.min_price {
            if listing.price.is_some_and(|price| price < min_price) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError>;

    /// Active listings matching `query`, newest first, at most `query.limit`.
    async fn search(&self, query: &ListingQuery) -> Result<Vec<Listing>, RepositoryError>;

    async fn save(&self, listing: Listing) -> Result<ListingId, RepositoryError>;

    /// Appends an outreach event while holding the listing's write lock and
    /// returns how many outreach attempts the listing now has on record.
    async fn record_outreach(&self, event: OutreachEvent) -> Result<usize, RepositoryError>;

    async fn list_outreach(&self, id: ListingId) -> Result<Vec<OutreachEvent>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: StoredMessage) -> Result<(), RepositoryError>;

    async fn latest_assistant(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<StoredMessage>, RepositoryError>;

    /// The last `limit` messages in chronological order.
    async fn recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;
}

#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Active articles ranked by how many `terms` they mention.
    async fn search(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<KnowledgeArticle>, RepositoryError>;

    async fn save(&self, article: KnowledgeArticle) -> Result<i64, RepositoryError>;
}

pub(crate) fn rank_articles(
    articles: Vec<KnowledgeArticle>,
    terms: &[String],
    limit: usize,
) -> Vec<KnowledgeArticle> {
    let mut scored: Vec<(usize, KnowledgeArticle)> = articles
        .into_iter()
        .filter(|article| article.is_active)
        .map(|article| (article.match_score(terms), article))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|(left_score, left), (right_score, right)| {
        right_score.cmp(left_score).then(left.id.cmp(&right.id))
    });
    scored.into_iter().take(limit).map(|(_, article)| article).collect()
}
