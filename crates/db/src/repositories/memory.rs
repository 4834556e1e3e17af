use std::collections::HashMap;

use tokio::sync::{Mutex, RwLock};

use concierge_core::domain::conversation::ConversationId;
use concierge_core::domain::knowledge::KnowledgeArticle;
use concierge_core::domain::listing::{Listing, ListingId};
use concierge_core::domain::message::{MessageRole, StoredMessage};
use concierge_core::domain::outreach::OutreachEvent;

use super::{
    rank_articles, KnowledgeRepository, ListingQuery, ListingRepository, MessageRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryListingRepository {
    listings: RwLock<HashMap<i64, Listing>>,
    // Serialises outreach appends the way `BEGIN IMMEDIATE` does for SQLite.
    outreach: Mutex<Vec<OutreachEvent>>,
}

#[async_trait::async_trait]
impl ListingRepository for InMemoryListingRepository {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, RepositoryError> {
        let listings = self.listings.read().await;
        Ok(listings.get(&id.0).cloned())
    }

    async fn search(&self, query: &ListingQuery) -> Result<Vec<Listing>, RepositoryError> {
        let listings = self.listings.read().await;
        let mut matches: Vec<Listing> = listings
            .values()
            .filter(|listing| query.matches_columns(listing) && query.matches_structured(listing))
            .cloned()
            .collect();
        matches.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then(right.id.cmp(&left.id))
        });
        matches.truncate(query.limit);
        Ok(matches)
    }

    async fn save(&self, mut listing: Listing) -> Result<ListingId, RepositoryError> {
        let mut listings = self.listings.write().await;
        if listing.id.0 <= 0 {
            let next = listings.keys().copied().max().unwrap_or(0) + 1;
            listing.id = ListingId(next);
        }
        let id = listing.id;
        listings.insert(id.0, listing);
        Ok(id)
    }

    async fn record_outreach(&self, event: OutreachEvent) -> Result<usize, RepositoryError> {
        let mut outreach = self.outreach.lock().await;
        let active = self
            .listings
            .read()
            .await
            .get(&event.listing_id.0)
            .map(|listing| listing.is_active)
            .unwrap_or(false);
        if !active {
            return Err(RepositoryError::ListingNotFound(event.listing_id));
        }

        let listing_id = event.listing_id;
        outreach.push(event);
        Ok(outreach.iter().filter(|existing| existing.listing_id == listing_id).count())
    }

    async fn list_outreach(&self, id: ListingId) -> Result<Vec<OutreachEvent>, RepositoryError> {
        let outreach = self.outreach.lock().await;
        Ok(outreach.iter().filter(|event| event.listing_id == id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: StoredMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.entry(message.conversation_id.0.clone()).or_default().push(message);
        Ok(())
    }

    async fn latest_assistant(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&conversation_id.0).and_then(|log| {
            log.iter().rev().find(|message| message.role == MessageRole::Assistant).cloned()
        }))
    }

    async fn recent(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let log = messages.get(&conversation_id.0).map(Vec::as_slice).unwrap_or_default();
        Ok(log[log.len().saturating_sub(limit)..].to_vec())
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeRepository {
    articles: RwLock<Vec<KnowledgeArticle>>,
}

#[async_trait::async_trait]
impl KnowledgeRepository for InMemoryKnowledgeRepository {
    async fn search(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<KnowledgeArticle>, RepositoryError> {
        let articles = self.articles.read().await;
        Ok(rank_articles(articles.clone(), terms, limit))
    }

    async fn save(&self, mut article: KnowledgeArticle) -> Result<i64, RepositoryError> {
        let mut articles = self.articles.write().await;
        if article.id <= 0 {
            article.id = articles.iter().map(|existing| existing.id).max().unwrap_or(0) + 1;
        }
        let id = article.id;
        articles.retain(|existing| existing.id != id);
        articles.push(article);
        Ok(id)
    }
}
