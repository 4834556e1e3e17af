use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use rust_decimal::Decimal;

use concierge_core::domain::listing::ListingType;
use concierge_core::domain::message::{MessageRole, StoredMessage};
use concierge_core::domain::requirements::{RentalDuration, SearchRequirements};
use concierge_core::location::find_location_in_text;

const AMOUNT: &str = r"[£$€]?\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?";

static MAX_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:under|below|max(?:imum)?|up to|less than|no more than|budget(?: of| is)?|cheaper than)\s*{AMOUNT}"
    ))
    .expect("valid max price regex")
});
static MIN_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:over|above|at least|more than|min(?:imum)?)\s*{AMOUNT}"))
        .expect("valid min price regex")
});
static PRICE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"between\s*[£$€]?\s*(\d[\d,]*)\s*(k\b)?\s*(?:and|-|to)\s*[£$€]?\s*(\d[\d,]*)\s*(k\b)?",
    )
    .expect("valid price range regex")
});
static BARE_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[£$€]\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?|(\d[\d,]*(?:\.\d+)?)\s*(k\b)?\s*(?:gbp|eur|usd|try|tl|pounds?|euros?|dollars?|lira)\b",
    )
    .expect("valid bare price regex")
});
static BEDROOMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*\+\s*1|(\d+)\s*-?\s*(?:bed|bedroom|br)s?\b").expect("valid bedrooms regex")
});

const PROPERTY_TYPES: &[(&str, &str)] = &[
    ("penthouse", "penthouse"),
    ("apartment", "apartment"),
    ("flat", "apartment"),
    ("daire", "apartment"),
    ("villa", "villa"),
    ("bungalow", "bungalow"),
    ("duplex", "duplex"),
    ("studio", "studio"),
    ("house", "house"),
];

const FEATURES: &[&str] = &[
    "pool",
    "garden",
    "sea view",
    "mountain view",
    "parking",
    "gym",
    "balcony",
    "terrace",
    "elevator",
    "air conditioning",
    "wifi",
    "jacuzzi",
    "fireplace",
    "gated",
];

const CHEAPER_PHRASES: &[&str] =
    &["cheaper", "less expensive", "lower price", "more affordable", "daha ucuz", "дешевле"];

/// Pulls structured search filters out of free text without the LLM.
#[derive(Clone, Debug, Default)]
pub struct RequirementExtractor;

impl RequirementExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str) -> SearchRequirements {
        let normalized_text = normalize_text(text);
        let (min_price, max_price) = extract_price_bounds(&normalized_text);

        SearchRequirements {
            listing_type: extract_listing_type(&normalized_text),
            property_type: extract_property_type(&normalized_text),
            location: find_location_in_text(&normalized_text).map(str::to_string),
            bedrooms: extract_bedrooms(&normalized_text),
            min_price,
            max_price,
            currency: extract_currency(&normalized_text),
            furnished: extract_furnished(&normalized_text),
            pets_allowed: extract_pets(&normalized_text),
            duration: extract_duration(&normalized_text),
            features: extract_features(&normalized_text),
        }
    }
}

pub fn wants_cheaper(text: &str) -> bool {
    let normalized_text = normalize_text(text);
    CHEAPER_PHRASES.iter().any(|phrase| normalized_text.contains(phrase))
}

/// Compact transcript of the last `turns` messages for LLM prompts.
pub fn history_summary(messages: &[StoredMessage], turns: usize) -> String {
    let start = messages.len().saturating_sub(turns);
    messages[start..]
        .iter()
        .map(|message| {
            let speaker = match message.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            format!("{speaker}: {}", truncate(&message.content, 160))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}

fn extract_listing_type(normalized_text: &str) -> Option<ListingType> {
    let sale =
        ["for sale", "to buy", "buy a", "buying", "purchase", "satılık", "satilik", "kaufen"];
    let rent = [
        "rent", "to let", "lease", "per month", "monthly", "kiralık", "kiralik", "miete", "аренд",
    ];
    if sale.iter().any(|marker| normalized_text.contains(marker)) {
        Some(ListingType::Sale)
    } else if rent.iter().any(|marker| normalized_text.contains(marker)) {
        Some(ListingType::Rent)
    } else {
        None
    }
}

/// Every word that names `property_type` in listing text, e.g. "apartment"
/// also covers "flat" and "daire".
pub(crate) fn property_type_terms(property_type: &str) -> Vec<String> {
    let property_type = property_type.trim().to_lowercase();
    let mut terms: Vec<String> = PROPERTY_TYPES
        .iter()
        .filter(|(_, canonical)| *canonical == property_type)
        .map(|(marker, _)| (*marker).to_string())
        .collect();
    if !terms.contains(&property_type) && !property_type.is_empty() {
        terms.push(property_type);
    }
    terms
}

fn extract_property_type(normalized_text: &str) -> Option<String> {
    PROPERTY_TYPES
        .iter()
        .find(|(marker, _)| normalized_text.contains(marker))
        .map(|(_, property_type)| (*property_type).to_string())
}

fn extract_bedrooms(normalized_text: &str) -> Option<u32> {
    let captures = BEDROOMS.captures(normalized_text)?;
    captures.get(1).or_else(|| captures.get(2)).and_then(|number| number.as_str().parse().ok())
}

fn parse_amount(digits: &str, thousands: bool) -> Option<Decimal> {
    let amount = Decimal::from_str(&digits.replace(',', "")).ok()?;
    Some(if thousands { amount * Decimal::from(1000) } else { amount })
}

fn amount_at(captures: &Captures<'_>, digits: usize, suffix: usize) -> Option<Decimal> {
    parse_amount(captures.get(digits)?.as_str(), captures.get(suffix).is_some())
}

fn extract_price_bounds(normalized_text: &str) -> (Option<Decimal>, Option<Decimal>) {
    if let Some(captures) = PRICE_RANGE.captures(normalized_text) {
        let low = amount_at(&captures, 1, 2);
        let high = amount_at(&captures, 3, 4);
        if low.is_some() && high.is_some() {
            return (low, high);
        }
    }

    let min_price =
        MIN_PRICE.captures(normalized_text).and_then(|captures| amount_at(&captures, 1, 2));
    let mut max_price =
        MAX_PRICE.captures(normalized_text).and_then(|captures| amount_at(&captures, 1, 2));
    // A bare amount ("£500", "500 gbp") reads as a ceiling unless it was the floor.
    if max_price.is_none() && min_price.is_none() {
        max_price = BARE_PRICE.captures(normalized_text).and_then(|captures| {
            amount_at(&captures, 1, 2).or_else(|| amount_at(&captures, 3, 4))
        });
    }
    (min_price, max_price)
}

fn extract_currency(normalized_text: &str) -> Option<String> {
    let currencies: [(&[&str], &str); 4] = [
        (&["£", "gbp", "pound"], "GBP"),
        (&["€", "eur"], "EUR"),
        (&["$", "usd", "dollar"], "USD"),
        (&[" tl", "try", "lira"], "TRY"),
    ];
    currencies
        .iter()
        .find(|(markers, _)| markers.iter().any(|marker| normalized_text.contains(marker)))
        .map(|(_, code)| (*code).to_string())
}

fn extract_furnished(normalized_text: &str) -> Option<bool> {
    if normalized_text.contains("unfurnished") || normalized_text.contains("not furnished") {
        Some(false)
    } else if normalized_text.contains("furnished") || normalized_text.contains("eşyalı") {
        Some(true)
    } else {
        None
    }
}

fn extract_pets(normalized_text: &str) -> Option<bool> {
    if normalized_text.contains("no pets") {
        return Some(false);
    }
    let markers = ["pet friendly", "pet-friendly", "pets allowed", "with pets", "my dog", "my cat"];
    markers.iter().any(|marker| normalized_text.contains(marker)).then_some(true)
}

fn extract_duration(normalized_text: &str) -> Option<RentalDuration> {
    let short = ["short term", "short-term", "holiday", "weekly", "nightly", "few weeks"];
    let long = ["long term", "long-term", "yearly", "annual", "12 months", "one year"];
    if short.iter().any(|marker| normalized_text.contains(marker)) {
        Some(RentalDuration::ShortTerm)
    } else if long.iter().any(|marker| normalized_text.contains(marker)) {
        Some(RentalDuration::LongTerm)
    } else {
        None
    }
}

fn extract_features(normalized_text: &str) -> Vec<String> {
    FEATURES
        .iter()
        .filter(|feature| normalized_text.contains(*feature))
        .map(|feature| (*feature).to_string())
        .collect()
}
