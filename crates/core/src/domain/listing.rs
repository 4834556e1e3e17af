use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contact::{extract_contact, ContactHandle};
use crate::domain::response::RecommendationCard;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub i64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    Rent,
    Sale,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rent => "rent",
            Self::Sale => "sale",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rent" | "rental" | "long_term_rent" | "short_term_rent" => Some(Self::Rent),
            "sale" | "buy" | "for_sale" => Some(Self::Sale),
            _ => None,
        }
    }
}

/// Contact fields as they arrive from scraped or hand-entered listings.
///
/// Unknown keys are preserved so a round trip through the repository never
/// drops data the routing core does not understand.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub contact_info: ContactInfo,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub verified_with_photos: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub furnished: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pets_allowed: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub is_active: bool,
    pub location: String,
    pub price: Option<Decimal>,
    pub currency: String,
    pub listing_type: ListingType,
    pub structured_data: StructuredData,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn title(&self) -> String {
        self.structured_data
            .title
            .clone()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| format!("Listing #{}", self.id))
    }

    pub fn image_count(&self) -> usize {
        self.structured_data.image_urls.len()
    }

    pub fn contact(&self) -> Option<ContactHandle> {
        extract_contact(&self.structured_data)
    }

    pub fn has_contact_info(&self) -> bool {
        self.contact().is_some()
    }

    /// Text used for free-form feature matching (title, description, features, raw text).
    pub fn searchable_text(&self) -> String {
        let data = &self.structured_data;
        let mut parts = Vec::new();
        parts.extend(data.title.iter().cloned());
        parts.extend(data.description.iter().cloned());
        parts.extend(data.features.iter().cloned());
        parts.extend(data.raw_text.iter().cloned());
        parts.join(" ").to_lowercase()
    }

    pub fn to_card(&self) -> RecommendationCard {
        RecommendationCard {
            id: self.id,
            title: self.title(),
            location: self.location.clone(),
            price: self.price,
            currency: self.currency.clone(),
            listing_type: self.listing_type,
            bedrooms: self.structured_data.bedrooms,
            image_urls: self.structured_data.image_urls.clone(),
            verified_with_photos: self.structured_data.verified_with_photos,
        }
    }
}
