use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::listing::ListingType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalDuration {
    ShortTerm,
    LongTerm,
}

/// Structured search filters pulled out of a user's request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_type: Option<ListingType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub furnished: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pets_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<RentalDuration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl SearchRequirements {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Fills every field left unset in `self` from `previous`.
    /// Features are unioned, keeping `self`'s order first.
    pub fn merged_over(mut self, previous: &SearchRequirements) -> Self {
        macro_rules! inherit {
            ($($field:ident),+) => {
                $(
                    if self.$field.is_none() {
                        self.$field = previous.$field.clone();
                    }
                )+
            };
        }

        inherit!(
            listing_type,
            property_type,
            location,
            bedrooms,
            min_price,
            max_price,
            currency,
            furnished,
            pets_allowed,
            duration
        );

        for feature in &previous.features {
            if !self.features.iter().any(|existing| existing.eq_ignore_ascii_case(feature)) {
                self.features.push(feature.clone());
            }
        }
        self
    }

    /// One-line human summary used in search replies and history summaries.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(bedrooms) = self.bedrooms {
            parts.push(format!("{bedrooms} bedroom"));
        }
        if let Some(property_type) = &self.property_type {
            parts.push(property_type.clone());
        }
        if let Some(listing_type) = self.listing_type {
            parts.push(format!("for {}", listing_type.as_str()));
        }
        if let Some(location) = &self.location {
            parts.push(format!("in {location}"));
        }
        if let Some(max_price) = self.max_price {
            match self.currency.as_deref() {
                Some(currency) => parts.push(format!("under {max_price} {currency}")),
                None => parts.push(format!("under {max_price}")),
            }
        }
        if self.furnished == Some(true) {
            parts.push("furnished".to_string());
        }
        if self.pets_allowed == Some(true) {
            parts.push("pets allowed".to_string());
        }
        if !self.features.is_empty() {
            parts.push(format!("with {}", self.features.join(", ")));
        }
        parts.join(" ")
    }
}
