//! Location alias table for North Cyprus listings.
//!
//! Listings are scraped from sources that spell the same town several ways
//! (Turkish, Greek and English names, with and without diacritics). Every alias
//! maps to one canonical name, and villages carry a single parent region used
//! as the search fallback when the village itself has no matches.

struct Region {
    canonical: &'static str,
    aliases: &'static [&'static str],
    parent: Option<&'static str>,
}

const REGIONS: &[Region] = &[
    Region { canonical: "Girne", aliases: &["girne", "kyrenia", "keryneia"], parent: None },
    Region {
        canonical: "Famagusta",
        aliases: &["famagusta", "gazimagusa", "gazimağusa", "magusa", "mağusa"],
        parent: None,
    },
    Region { canonical: "Nicosia", aliases: &["nicosia", "lefkosa", "lefkoşa"], parent: None },
    Region { canonical: "Iskele", aliases: &["iskele", "i̇skele", "trikomo"], parent: None },
    Region {
        canonical: "Guzelyurt",
        aliases: &["guzelyurt", "güzelyurt", "morphou"],
        parent: None,
    },
    Region { canonical: "Lefke", aliases: &["lefke", "lefka"], parent: None },
    Region { canonical: "Alsancak", aliases: &["alsancak", "karavas"], parent: Some("Girne") },
    Region { canonical: "Lapta", aliases: &["lapta", "lapithos"], parent: Some("Girne") },
    Region { canonical: "Catalkoy", aliases: &["catalkoy", "çatalköy"], parent: Some("Girne") },
    Region { canonical: "Esentepe", aliases: &["esentepe"], parent: Some("Girne") },
    Region {
        canonical: "Karsiyaka",
        aliases: &["karsiyaka", "karşıyaka"],
        parent: Some("Girne"),
    },
    Region { canonical: "Ozankoy", aliases: &["ozankoy", "ozanköy"], parent: Some("Girne") },
    Region { canonical: "Bellapais", aliases: &["bellapais", "beylerbeyi"], parent: Some("Girne") },
    Region {
        canonical: "Karaoglanoglu",
        aliases: &["karaoglanoglu", "karaoğlanoğlu"],
        parent: Some("Girne"),
    },
    Region { canonical: "Edremit", aliases: &["edremit"], parent: Some("Girne") },
    Region { canonical: "Long Beach", aliases: &["long beach"], parent: Some("Iskele") },
    Region { canonical: "Bogaz", aliases: &["bogaz", "boğaz"], parent: Some("Iskele") },
    Region { canonical: "Gonyeli", aliases: &["gonyeli", "gönyeli"], parent: Some("Nicosia") },
];

fn region(canonical: &str) -> Option<&'static Region> {
    REGIONS.iter().find(|region| region.canonical.eq_ignore_ascii_case(canonical))
}

/// Maps a free-form location string onto its canonical name.
pub fn normalize_location(input: &str) -> Option<&'static str> {
    let folded = input.trim().to_lowercase();
    if folded.is_empty() {
        return None;
    }

    REGIONS
        .iter()
        .find(|region| {
            region.canonical.to_lowercase() == folded || region.aliases.contains(&folded.as_str())
        })
        .map(|region| region.canonical)
}

/// Finds the first known location mentioned as a whole word in `text`.
pub fn find_location_in_text(text: &str) -> Option<&'static str> {
    let folded = text.to_lowercase();
    REGIONS
        .iter()
        .filter_map(|region| {
            region
                .aliases
                .iter()
                .filter_map(|alias| whole_word_position(&folded, alias))
                .min()
                .map(|position| (position, region.canonical))
        })
        .min_by_key(|(position, _)| *position)
        .map(|(_, canonical)| canonical)
}

pub fn parent_region(canonical: &str) -> Option<&'static str> {
    region(canonical).and_then(|region| region.parent)
}

/// Every spelling that should match a stored `location` column for `canonical`.
pub fn search_terms(canonical: &str) -> Vec<String> {
    match region(canonical) {
        Some(region) => {
            let mut terms = vec![region.canonical.to_lowercase()];
            for alias in region.aliases {
                if !terms.iter().any(|term| term == alias) {
                    terms.push((*alias).to_string());
                }
            }
            terms
        }
        None => vec![canonical.trim().to_lowercase()],
    }
}

pub fn is_known_location(text: &str) -> bool {
    find_location_in_text(text).is_some()
}

fn whole_word_position(haystack: &str, needle: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(found) = haystack[offset..].find(needle) {
        let start = offset + found;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |character| !character.is_alphanumeric());
        let after_ok =
            haystack[end..].chars().next().map_or(true, |character| !character.is_alphanumeric());
        if before_ok && after_ok {
            return Some(start);
        }
        offset = end;
    }
    None
}
