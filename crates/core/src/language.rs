use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Tr,
    Ru,
    De,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Tr => "tr",
            Self::Ru => "ru",
            Self::De => "de",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Self::En),
            "tr" | "turkish" => Some(Self::Tr),
            "ru" | "russian" => Some(Self::Ru),
            "de" | "german" => Some(Self::De),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

const TURKISH_MARKERS: &[&str] = &[
    "merhaba", "teşekkür", "tesekkur", "kiralık", "kiralik", "satılık", "satilik", "daire",
    "ev ", "oda", "yatak", "lütfen", "lutfen", "fiyat", "istiyorum", "var mı", "nerede",
];

const GERMAN_MARKERS: &[&str] = &[
    "wohnung", "haus ", "zimmer", "miete", "mieten", "kaufen", "danke", "bitte", "ich ",
    "suche", "schlafzimmer", "gibt es",
];

const ENGLISH_MARKERS: &[&str] = &[
    "the ", "please", "looking for", "apartment", "flat", "house", "bedroom", "thanks",
    "hello", "hi ", "rent", "contact", "any ", "what", "show me",
];

/// Guesses the reply language for `text`.
///
/// Returns `None` when the text carries no usable signal (numbers, emoji,
/// one-word replies) so callers can keep the conversation's previous language.
pub fn detect_language(text: &str) -> Option<Language> {
    let folded = format!("{} ", text.trim().to_lowercase());
    if folded.trim().is_empty() {
        return None;
    }

    let letters = folded.chars().filter(|character| character.is_alphabetic()).count();
    let cyrillic =
        folded.chars().filter(|character| matches!(character, '\u{0400}'..='\u{04FF}')).count();
    if letters > 0 && cyrillic * 2 >= letters {
        return Some(Language::Ru);
    }

    let turkish_letters =
        folded.chars().any(|character| matches!(character, 'ğ' | 'ş' | 'ı' | 'İ'));
    let score =
        |markers: &[&str]| markers.iter().filter(|marker| folded.contains(**marker)).count();

    let turkish = score(TURKISH_MARKERS) + usize::from(turkish_letters) * 2;
    let german_letters = folded.contains('ß') || folded.contains('ä');
    let german = score(GERMAN_MARKERS) + usize::from(german_letters && !turkish_letters);
    let english = score(ENGLISH_MARKERS);

    let best = [(Language::Tr, turkish), (Language::De, german), (Language::En, english)]
        .into_iter()
        .max_by_key(|(_, score)| *score)?;

    (best.1 > 0).then_some(best.0)
}

#[cfg(test)]
mod tests {
    use super::{detect_language, Language};

    #[test]
    fn detects_supported_languages() {
        assert_eq!(detect_language("Looking for a flat in Girne"), Some(Language::En));
        assert_eq!(detect_language("Girne'de kiralık daire arıyorum"), Some(Language::Tr));
        assert_eq!(detect_language("Ищу квартиру в Кирении"), Some(Language::Ru));
        assert_eq!(detect_language("Ich suche eine Wohnung in Kyrenia"), Some(Language::De));
    }

    #[test]
    fn signal_free_text_keeps_previous_language() {
        assert_eq!(detect_language("   "), None);
        assert_eq!(detect_language("500"), None);
    }

    #[test]
    fn codes_round_trip() {
        assert_eq!(Language::from_code("TR"), Some(Language::Tr));
        assert_eq!(Language::Ru.code(), "ru");
    }
}
