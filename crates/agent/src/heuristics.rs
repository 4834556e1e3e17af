//! Keyword heuristics over a single utterance.
//!
//! Every predicate is pure and case-insensitive. They exist because the LLM is
//! unreliable on short or ambiguous messages; the resolver decides how much to
//! trust them.

use std::sync::LazyLock;

use regex::Regex;

use concierge_core::location::is_known_location;

static BEDROOM_SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*\+\s*1").expect("valid bedroom shorthand regex"));
static BEDROOM_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(bed|bedroom)s?").expect("valid bedroom count regex"));
static LISTING_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:listing|property|ad)\s*(?:#|no\.?\s*|number\s*)?(\d+)\b")
        .expect("valid listing reference regex")
});
static NUMERIC_ORDINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})(?:st|nd|rd|th)\b|\b(?:option|number|no\.?)\s*#?(\d{1,2})\b")
        .expect("valid ordinal regex")
});

const PROPERTY_SEARCH_KEYWORDS: &[&str] = &[
    "apartment",
    "flat for",
    "flats",
    "villa",
    "house",
    "studio",
    "penthouse",
    "bungalow",
    "duplex",
    "property",
    "properties",
    "to rent",
    "for rent",
    "rental",
    "for sale",
    "to buy",
    "bedroom",
    "place to stay",
    "place to live",
    "accommodation",
    "real estate",
    "daire",
    "kiralık",
    "satılık",
    "квартир",
    "wohnung",
];

const SEARCH_VERBS: &[&str] = &[
    "looking for",
    "show me",
    "find",
    "search",
    "need a",
    "want a",
    "under",
    "budget",
    "anything",
];

const OUTREACH_PHRASES: &[&str] = &[
    "contact the agent",
    "contact the owner",
    "contact the seller",
    "contact the landlord",
    "contact them",
    "contact seller",
    "contact agent",
    "contact listing",
    "reach out",
    "get in touch",
    "message the agent",
    "message the owner",
    "ask the agent",
    "ask the owner",
    "ask the landlord",
    "call the agent",
    "whatsapp the",
    "can you contact",
    "could you contact",
    "please contact",
];

const STATUS_PHRASES: &[&str] = &[
    "any update",
    "any news",
    "any reply",
    "any response",
    "any word",
    "did they reply",
    "did they respond",
    "did they answer",
    "did they send",
    "did the agent",
    "did the owner",
    "have they sent",
    "have they replied",
    "heard back",
    "hear back",
    "what did they say",
    "still waiting",
    "status",
];

const PHOTO_WORDS: &[&str] = &[
    "photo",
    "picture",
    "pics",
    "image",
    "fotoğraf",
    "fotograf",
    "resim",
    "фото",
    "bilder",
    "fotos",
];

const AVAILABILITY_PHRASES: &[&str] = &[
    "available",
    "availability",
    "still free",
    "still for rent",
    "still for sale",
    "müsait",
    "musait",
    "свободн",
    "verfügbar",
];

const CONTINUATION_WORDS: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "ok",
    "okay",
    "sure",
    "thanks",
    "thank you",
    "great",
    "cool",
    "nice",
    "sounds good",
    "go on",
    "tell me more",
    "continue",
    "and then",
    "evet",
    "tamam",
    "да",
    "ja",
];

const SHOW_OPTIONS_PHRASES: &[&str] = &[
    "show me the options",
    "show me options",
    "show options",
    "show them",
    "show me them",
    "show me those",
    "show me more",
    "show me the listings",
    "show me what you have",
    "show me what you found",
    "let me see them",
    "see the options",
    "what options",
    "any options",
    "more options",
    "other options",
    "what else do you have",
    "what do you have",
    "send me the listings",
];

const ORDINAL_WORDS: &[(&str, usize)] = &[
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("sixth", 6),
    ("seventh", 7),
    ("eighth", 8),
    ("ninth", 9),
    ("tenth", 10),
];

fn fold(text: &str) -> String {
    text.trim().to_lowercase()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Like `contains_any`, but each needle must sit on word boundaries.
fn contains_any_word(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| contains_word(haystack, needle))
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        before.map_or(true, |c| !c.is_alphanumeric())
            && after.map_or(true, |c| !c.is_alphanumeric())
    })
}

pub fn looks_like_property_search(text: &str) -> bool {
    let folded = fold(text);
    if folded.is_empty() {
        return false;
    }
    BEDROOM_SHORTHAND.is_match(&folded)
        || BEDROOM_COUNT.is_match(&folded)
        || contains_any(&folded, PROPERTY_SEARCH_KEYWORDS)
        || (is_known_location(&folded) && contains_any(&folded, SEARCH_VERBS))
}

pub fn looks_like_agent_outreach(text: &str) -> bool {
    let folded = fold(text);
    if folded.is_empty() {
        return false;
    }
    contains_any(&folded, OUTREACH_PHRASES)
        || (contains_word(&folded, "contact")
            && (explicit_listing_reference(&folded).is_some()
                || ordinal_reference(&folded).is_some()))
}

pub fn looks_like_status_update(text: &str) -> bool {
    let folded = fold(text);
    !folded.is_empty() && contains_any(&folded, STATUS_PHRASES)
}

pub fn user_asked_for_photos(text: &str) -> bool {
    let folded = fold(text);
    !folded.is_empty() && contains_any(&folded, PHOTO_WORDS)
}

pub fn asks_about_availability(text: &str) -> bool {
    let folded = fold(text);
    !folded.is_empty() && contains_any(&folded, AVAILABILITY_PHRASES)
}

pub fn looks_like_conversation_continuation(text: &str) -> bool {
    let folded = fold(text);
    !folded.is_empty() && contains_any_word(&folded, CONTINUATION_WORDS)
}

pub fn looks_like_show_options_followup(text: &str) -> bool {
    let folded = fold(text);
    !folded.is_empty() && contains_any(&folded, SHOW_OPTIONS_PHRASES)
}

/// `"listing 5"`, `"listing #5"`, `"property no. 5"` => `Some(5)`.
pub fn explicit_listing_reference(text: &str) -> Option<i64> {
    let folded = fold(text);
    LISTING_REFERENCE
        .captures(&folded)
        .and_then(|captures| captures.get(1))
        .and_then(|number| number.as_str().parse().ok())
}

/// 1-based position into the last shown recommendations: "the second one",
/// "2nd", "option 3". Callers check `explicit_listing_reference` first.
pub fn ordinal_reference(text: &str) -> Option<usize> {
    let folded = fold(text);
    if folded.is_empty() {
        return None;
    }
    if let Some((_, ordinal)) = ORDINAL_WORDS.iter().find(|(word, _)| contains_word(&folded, word))
    {
        return Some(*ordinal);
    }
    NUMERIC_ORDINAL.captures(&folded).and_then(|captures| {
        captures
            .get(1)
            .or_else(|| captures.get(2))
            .and_then(|number| number.as_str().parse().ok())
            .filter(|ordinal| *ordinal > 0)
    })
}

/// Pinned outreach form: the user names the listing they want contacted.
pub fn contact_listing_reference(text: &str) -> Option<i64> {
    if !looks_like_agent_outreach(text) {
        return None;
    }
    explicit_listing_reference(text)
}

/// All predicates evaluated once per turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeuristicSignals {
    pub property_search: bool,
    pub agent_outreach: bool,
    pub status_update: bool,
    pub asked_for_photos: bool,
    pub conversation_continuation: bool,
    pub show_options_followup: bool,
    pub listing_reference: Option<i64>,
    pub ordinal: Option<usize>,
}

impl HeuristicSignals {
    pub fn classify(text: &str) -> Self {
        let listing_reference = explicit_listing_reference(text);
        Self {
            property_search: looks_like_property_search(text),
            agent_outreach: looks_like_agent_outreach(text),
            status_update: looks_like_status_update(text),
            asked_for_photos: user_asked_for_photos(text),
            conversation_continuation: looks_like_conversation_continuation(text),
            show_options_followup: looks_like_show_options_followup(text),
            listing_reference,
            ordinal: if listing_reference.is_some() { None } else { ordinal_reference(text) },
        }
    }

    pub fn contact_listing_reference(&self) -> Option<i64> {
        if self.agent_outreach {
            self.listing_reference
        } else {
            None
        }
    }
}
