use concierge_core::config::RoutingConfig;
use concierge_core::domain::intent::{IntentResult, IntentSource, IntentType};

use crate::heuristics::HeuristicSignals;

const PINNED_CONFIDENCE: f32 = 0.95;
const DEFAULT_CONFIDENCE: f32 = 0.4;

/// Which rule produced the final intent. Reported in logs and on the response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolverRule {
    PinnedListingContact,
    ConfidentLlm,
    OutreachHeuristic,
    StatusOrPhotos,
    PropertySearchHeuristic,
    ShowOptionsFollowup,
    LlmLabel,
    DefaultGeneralChat,
}

impl ResolverRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PinnedListingContact => "pinned_listing_contact",
            Self::ConfidentLlm => "confident_llm",
            Self::OutreachHeuristic => "outreach_heuristic",
            Self::StatusOrPhotos => "status_or_photos",
            Self::PropertySearchHeuristic => "property_search_heuristic",
            Self::ShowOptionsFollowup => "show_options_followup",
            Self::LlmLabel => "llm_label",
            Self::DefaultGeneralChat => "default_general_chat",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub intent: IntentResult,
    pub rule: ResolverRule,
}

/// What the rules look at.
#[derive(Clone, Copy, Debug)]
pub struct ResolverInput<'a> {
    pub llm: &'a IntentResult,
    pub signals: &'a HeuristicSignals,
}

struct OverrideRule {
    rule: ResolverRule,
    applies: fn(&ResolverInput<'_>) -> bool,
    intent_type: IntentType,
    confidence: f32,
}

fn outreach_requested(input: &ResolverInput<'_>) -> bool {
    input.signals.agent_outreach
}

fn status_or_photos(input: &ResolverInput<'_>) -> bool {
    input.signals.status_update || input.signals.asked_for_photos
}

fn property_search(input: &ResolverInput<'_>) -> bool {
    input.signals.property_search
}

fn show_options(input: &ResolverInput<'_>) -> bool {
    input.signals.show_options_followup
}

/// Heuristic overrides, evaluated top to bottom; the first match wins.
const OVERRIDES: &[OverrideRule] = &[
    OverrideRule {
        rule: ResolverRule::OutreachHeuristic,
        applies: outreach_requested,
        intent_type: IntentType::AgentOutreach,
        confidence: 0.95,
    },
    OverrideRule {
        rule: ResolverRule::StatusOrPhotos,
        applies: status_or_photos,
        intent_type: IntentType::StatusUpdate,
        confidence: 0.95,
    },
    OverrideRule {
        rule: ResolverRule::PropertySearchHeuristic,
        applies: property_search,
        intent_type: IntentType::PropertySearch,
        confidence: 0.9,
    },
    OverrideRule {
        rule: ResolverRule::ShowOptionsFollowup,
        applies: show_options,
        intent_type: IntentType::PropertySearch,
        confidence: 0.9,
    },
];

/// Merges the LLM's label with the keyword heuristics.
#[derive(Clone, Debug)]
pub struct IntentResolver {
    llm_accept_confidence: f32,
}

impl Default for IntentResolver {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

impl IntentResolver {
    pub fn new(routing: &RoutingConfig) -> Self {
        Self { llm_accept_confidence: routing.llm_accept_confidence }
    }

    pub fn resolve(&self, input: &ResolverInput<'_>) -> Resolution {
        if let Some(listing_id) = input.signals.contact_listing_reference() {
            return Resolution {
                intent: heuristic_intent(IntentType::AgentOutreach, PINNED_CONFIDENCE)
                    .with_reasoning(format!("explicit contact request for listing {listing_id}")),
                rule: ResolverRule::PinnedListingContact,
            };
        }

        let llm = input.llm;
        if !llm.is_fallback()
            && llm.confidence >= self.llm_accept_confidence
            && !llm.intent_type.is_generic()
        {
            return Resolution { intent: llm.clone(), rule: ResolverRule::ConfidentLlm };
        }

        if let Some(rule) = OVERRIDES.iter().find(|rule| (rule.applies)(input)) {
            return Resolution {
                intent: heuristic_intent(rule.intent_type, rule.confidence)
                    .with_reasoning(rule.rule.as_str()),
                rule: rule.rule,
            };
        }

        if !llm.is_fallback() {
            return Resolution { intent: llm.clone(), rule: ResolverRule::LlmLabel };
        }

        Resolution {
            intent: heuristic_intent(IntentType::GeneralChat, DEFAULT_CONFIDENCE),
            rule: ResolverRule::DefaultGeneralChat,
        }
    }
}

fn heuristic_intent(intent_type: IntentType, confidence: f32) -> IntentResult {
    // Constants above are in range and carry default tools, so this cannot fail.
    IntentResult::with_default_tool(intent_type, confidence, IntentSource::Heuristic)
        .unwrap_or_else(|_| IntentResult::fallback())
}
