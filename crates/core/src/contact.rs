use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::listing::StructuredData;

// Free-text numbers must carry an international (`+`, `00`) or trunk (`0`) prefix.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+|0)\d[\d \-()]{6,}\d").expect("phone pattern must compile")
});

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,4}[./]\d{1,2}[./]\d{1,4}\b").expect("date pattern must compile")
});

const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactChannel {
    Whatsapp,
    Phone,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHandle {
    pub channel: ContactChannel,
    pub number: String,
}

/// Picks the first usable phone-shaped identifier from a listing.
///
/// Order: `contact_info.whatsapp`, `contact_info.phone`, `contact_info.mobile`,
/// any other string under `contact_info`, then a prefixed phone number inside
/// `raw_text`.
pub fn extract_contact(data: &StructuredData) -> Option<ContactHandle> {
    let info = &data.contact_info;

    if let Some(number) = info.whatsapp.as_deref().and_then(normalize_phone) {
        return Some(ContactHandle { channel: ContactChannel::Whatsapp, number });
    }

    let direct = [info.phone.as_deref(), info.mobile.as_deref()];
    if let Some(number) = direct.into_iter().flatten().find_map(normalize_phone) {
        return Some(ContactHandle { channel: ContactChannel::Phone, number });
    }

    let extra = info.extra.values().filter_map(|value| value.as_str()).find_map(normalize_phone);
    if let Some(number) = extra {
        return Some(ContactHandle { channel: ContactChannel::Phone, number });
    }

    data.raw_text
        .as_deref()
        .and_then(find_phone_in_text)
        .map(|number| ContactHandle { channel: ContactChannel::Phone, number })
}

pub fn has_contact_info(data: &StructuredData) -> bool {
    extract_contact(data).is_some()
}

/// Finds the first prefixed phone number in free text. Dates such as
/// `01.06.2026` are blanked out first so they never read as trunk numbers.
pub fn find_phone_in_text(text: &str) -> Option<String> {
    let undated = DATE_PATTERN.replace_all(text, " ");
    PHONE_PATTERN
        .find_iter(&undated)
        .filter(|candidate| {
            !undated[..candidate.start()].ends_with(|previous: char| previous.is_ascii_digit())
        })
        .find_map(|candidate| normalize_phone(candidate.as_str()))
}

/// Reduces a phone-ish string to `+digits` / `digits`, rejecting anything
/// outside the E.164 digit range.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let international = trimmed.starts_with('+') || trimmed.starts_with("00");
    let mut digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with("00") {
        digits = digits.split_off(2);
    }

    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return None;
    }

    let letters = trimmed.chars().filter(|character| character.is_alphabetic()).count();
    if letters > 0 {
        return None;
    }

    Some(if international { format!("+{digits}") } else { digits })
}
