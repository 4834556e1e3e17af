//! Fixtures shared by handler, dispatcher and runtime tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use concierge_core::domain::listing::{Listing, ListingId, ListingType, StructuredData};
use concierge_core::{
    Clock, FixedClock, MessagingError, MessagingGateway, OutboundMessage, SendReceipt,
};
use concierge_db::repositories::{
    InMemoryKnowledgeRepository, InMemoryListingRepository, ListingRepository,
};
use concierge_whatsapp::OutreachTemplates;

use crate::handlers::HandlerServices;
use crate::llm::{DisabledLlmClient, LlmClient};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid timestamp")
}

pub fn listing(id: i64, location: &str, data: Value) -> Listing {
    Listing {
        id: ListingId(id),
        is_active: true,
        location: location.to_string(),
        price: Some(Decimal::from(450)),
        currency: "GBP".to_string(),
        listing_type: ListingType::Rent,
        structured_data: serde_json::from_value::<StructuredData>(data)
            .expect("structured data should decode"),
        created_at: t0(),
    }
}

/// Rentable flat with a WhatsApp contact and `images` photos.
pub fn reachable_listing(id: i64, location: &str, images: usize) -> Listing {
    listing(
        id,
        location,
        json!({
            "title": format!("Flat {id}"),
            "bedrooms": 2,
            "contact_info": {"whatsapp": "+90 548 863 9394"},
            "image_urls": (0..images)
                .map(|i| format!("https://img.test/{id}/{i}.jpg"))
                .collect::<Vec<_>>(),
        }),
    )
}

/// Gateway that records every message and answers from a fixed script.
pub struct RecordingGateway {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: bool,
}

impl RecordingGateway {
    pub fn accepting() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: false }
    }

    pub fn failing() -> Self {
        Self { sent: Mutex::new(Vec::new()), fail: true }
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    fn channel(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, MessagingError> {
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push(message.clone());
        if self.fail {
            return Err(MessagingError::Transport("connection refused".to_string()));
        }
        Ok(SendReceipt { ok: true, message_id: Some(format!("wamid.{}", sent.len())) })
    }
}

pub struct Fixture {
    pub listings: Arc<InMemoryListingRepository>,
    pub knowledge: Arc<InMemoryKnowledgeRepository>,
    pub gateway: Arc<RecordingGateway>,
    pub clock: Arc<FixedClock>,
    pub llm: Arc<dyn LlmClient>,
}

impl Fixture {
    pub async fn with_listings(listings: Vec<Listing>) -> Self {
        let repository = Arc::new(InMemoryListingRepository::default());
        for listing in listings {
            repository.save(listing).await.expect("save listing");
        }
        Self {
            listings: repository,
            knowledge: Arc::new(InMemoryKnowledgeRepository::default()),
            gateway: Arc::new(RecordingGateway::accepting()),
            clock: Arc::new(FixedClock::new(t0())),
            llm: Arc::new(DisabledLlmClient),
        }
    }

    pub fn with_gateway(mut self, gateway: RecordingGateway) -> Self {
        self.gateway = Arc::new(gateway);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = llm;
        self
    }

    pub fn services(&self) -> HandlerServices {
        HandlerServices {
            listings: self.listings.clone(),
            knowledge: self.knowledge.clone(),
            messaging: self.gateway.clone(),
            templates: Arc::new(OutreachTemplates::new().expect("templates")),
            llm: self.llm.clone(),
            clock: self.clock.clone() as Arc<dyn Clock>,
            max_search_results: 5,
            follow_up_minutes: 30,
        }
    }
}
