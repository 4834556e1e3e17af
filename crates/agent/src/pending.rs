use std::sync::Arc;

use tracing::debug;

use concierge_core::domain::conversation::{
    ConversationId, PendingAction, PendingActionKind, PendingStatus,
};
use concierge_core::domain::listing::Listing;
use concierge_db::repositories::{ListingRepository, MessageRepository, RepositoryError};

/// Reads outstanding outreach from the conversation log and checks whether
/// the agent has since delivered.
pub struct PendingActionTracker {
    messages: Arc<dyn MessageRepository>,
    listings: Arc<dyn ListingRepository>,
}

impl PendingActionTracker {
    pub fn new(messages: Arc<dyn MessageRepository>, listings: Arc<dyn ListingRepository>) -> Self {
        Self { messages, listings }
    }

    /// Pending actions recorded on the latest assistant message. Waiting photo
    /// requests whose listing now has new images come back as `completed`;
    /// the stored message is left untouched.
    pub async fn extract_pending_actions(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<PendingAction>, RepositoryError> {
        let Some(message) = self.messages.latest_assistant(conversation_id).await? else {
            return Ok(Vec::new());
        };

        let mut actions = message.context.pending_actions;
        for action in &mut actions {
            self.refresh(action).await?;
        }
        Ok(actions)
    }

    /// Re-checks a single action against the current listing.
    pub async fn refresh(&self, action: &mut PendingAction) -> Result<(), RepositoryError> {
        if action.kind != PendingActionKind::OutreachPictures
            || action.status != PendingStatus::Waiting
        {
            return Ok(());
        }

        if let Some(listing) = self.listings.find_by_id(action.listing_id).await? {
            if has_new_photos(action, &listing) {
                debug!(
                    event_name = "pending.completed",
                    listing_id = %action.listing_id,
                    baseline = action.baseline_image_count(),
                    current = listing.image_count(),
                );
                action.status = PendingStatus::Completed;
            }
        }
        Ok(())
    }
}

pub fn has_new_photos(action: &PendingAction, listing: &Listing) -> bool {
    listing.image_count() > action.baseline_image_count()
        || (listing.structured_data.verified_with_photos && !action.baseline_verified_with_photos())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use concierge_core::domain::conversation::{
        ConversationId, PendingAction, PendingActionKind, PendingStatus,
        BASELINE_VERIFIED_WITH_PHOTOS,
    };
    use concierge_core::domain::listing::{Listing, ListingId, ListingType, StructuredData};
    use concierge_core::domain::message::{MessageContext, MessageRole, StoredMessage};
    use concierge_db::repositories::{
        InMemoryListingRepository, InMemoryMessageRepository, ListingRepository,
        MessageRepository,
    };

    use super::PendingActionTracker;

    fn listing(images: usize, verified: bool) -> Listing {
        Listing {
            id: ListingId(5),
            is_active: true,
            location: "Girne".to_string(),
            price: None,
            currency: "GBP".to_string(),
            listing_type: ListingType::Rent,
            structured_data: StructuredData {
                image_urls: (0..images).map(|i| format!("https://img/{i}.jpg")).collect(),
                verified_with_photos: verified,
                ..StructuredData::default()
            },
            created_at: Utc::now(),
        }
    }

    async fn tracker_with(
        current: Listing,
        pending: Vec<PendingAction>,
    ) -> (PendingActionTracker, Arc<InMemoryMessageRepository>) {
        let listings = Arc::new(InMemoryListingRepository::default());
        listings.save(current).await.expect("save listing");
        let messages = Arc::new(InMemoryMessageRepository::default());
        messages
            .append(StoredMessage::new(
                ConversationId::from("c1"),
                MessageRole::Assistant,
                "I've contacted the agent",
                MessageContext { pending_actions: pending, ..MessageContext::default() },
                Utc::now(),
            ))
            .await
            .expect("append");
        (PendingActionTracker::new(messages.clone(), listings), messages)
    }

    fn waiting(baseline: usize) -> PendingAction {
        PendingAction::waiting(
            PendingActionKind::OutreachPictures,
            ListingId(5),
            Utc::now(),
            baseline,
        )
    }

    #[tokio::test]
    async fn unchanged_listing_stays_waiting() {
        let (tracker, _) = tracker_with(listing(2, false), vec![waiting(2)]).await;
        let actions =
            tracker.extract_pending_actions(&ConversationId::from("c1")).await.expect("extract");
        assert_eq!(actions[0].status, PendingStatus::Waiting);
    }

    #[tokio::test]
    async fn new_images_complete_the_returned_copy_only() {
        let (tracker, messages) = tracker_with(listing(4, false), vec![waiting(2)]).await;
        let conversation = ConversationId::from("c1");

        let actions = tracker.extract_pending_actions(&conversation).await.expect("extract");
        assert_eq!(actions[0].status, PendingStatus::Completed);

        let stored = messages.latest_assistant(&conversation).await.expect("load").expect("msg");
        assert_eq!(stored.context.pending_actions[0].status, PendingStatus::Waiting);
    }

    #[tokio::test]
    async fn verification_flag_counts_as_new_photos() {
        let (tracker, _) = tracker_with(listing(2, true), vec![waiting(2)]).await;
        let actions =
            tracker.extract_pending_actions(&ConversationId::from("c1")).await.expect("extract");
        assert_eq!(actions[0].status, PendingStatus::Completed);

        let already_verified = waiting(2).with_context(BASELINE_VERIFIED_WITH_PHOTOS, true);
        let (tracker, _) = tracker_with(listing(2, true), vec![already_verified]).await;
        let actions =
            tracker.extract_pending_actions(&ConversationId::from("c1")).await.expect("extract");
        assert_eq!(actions[0].status, PendingStatus::Waiting);
    }

    #[tokio::test]
    async fn no_assistant_message_means_nothing_pending() {
        let tracker = PendingActionTracker::new(
            Arc::new(InMemoryMessageRepository::default()),
            Arc::new(InMemoryListingRepository::default()),
        );
        let actions =
            tracker.extract_pending_actions(&ConversationId::from("empty")).await.expect("extract");
        assert!(actions.is_empty());
    }
}
