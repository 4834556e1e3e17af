use concierge_core::config::RoutingConfig;
use concierge_core::domain::conversation::ConversationState;
use concierge_core::domain::intent::{AgentDomain, IntentResult, IntentType};
use concierge_core::location::is_known_location;

const SWITCH_MARKERS: &[&str] = &[
    "actually",
    "instead",
    "forget that",
    "forget it",
    "never mind",
    "nevermind",
    "something else",
    "different question",
    "new question",
    "change of topic",
    "change topic",
    "switch to",
    "let's talk about",
    "unrelated",
    "by the way",
    "btw",
];

/// Openers that continue whatever the current topic is.
const REFINEMENT_OPENERS: &[&str] =
    &["what about", "how about", "and ", "also ", "only ", "but ", "same but", "ok and"];

/// Search refinements; only meaningful while a property search is active.
const SEARCH_REFINEMENTS: &[&str] = &[
    "cheaper",
    "less expensive",
    "bigger",
    "smaller",
    "larger",
    "more bedrooms",
    "fewer bedrooms",
    "closer to",
    "near the",
    "with a pool",
    "with pool",
    "sea view",
    "furnished",
    "pet friendly",
    "with parking",
    "without",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContinuityDecision {
    Stick,
    Switch,
    Clarify,
}

impl ContinuityDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stick => "stick",
            Self::Switch => "switch",
            Self::Clarify => "clarify",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContinuityReason {
    NoActiveDomain,
    ExplicitSwitchMarker,
    ShortInput,
    RefinementPhrase,
    HighConfidence,
    LowConfidence,
    AmbiguousConfidence,
    SameDomainBias,
    DefaultSwitch,
}

impl ContinuityReason {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::NoActiveDomain => "no_active_domain",
            Self::ExplicitSwitchMarker => "explicit_switch_marker",
            Self::ShortInput => "short_input",
            Self::RefinementPhrase => "refinement_phrase",
            Self::HighConfidence => "high_confidence",
            Self::LowConfidence => "low_confidence",
            Self::AmbiguousConfidence => "ambiguous_confidence",
            Self::SameDomainBias => "same_domain_bias",
            Self::DefaultSwitch => "default_switch",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContinuityOutcome {
    pub decision: ContinuityDecision,
    pub reason: ContinuityReason,
    /// Domain the turn runs in: the active one on stick, the new one on switch.
    pub domain: AgentDomain,
    /// Intent the dispatcher should act on.
    pub effective_intent: IntentType,
    pub clarification: Option<String>,
}

impl ContinuityOutcome {
    /// `"switch:explicit_switch_marker"`; stored on the response and message log.
    pub fn describe(&self) -> String {
        format!("{}:{}", self.decision.as_str(), self.reason.reason_code())
    }
}

/// Topic hysteresis: keeps a conversation anchored to its current domain
/// unless the new turn is clearly about something else.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuityPolicy {
    pub switch_threshold: f32,
    pub clarify_threshold: f32,
    pub stick_threshold: f32,
    pub short_input_max_words: usize,
}

impl Default for ContinuityPolicy {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

impl ContinuityPolicy {
    pub fn new(routing: &RoutingConfig) -> Self {
        Self {
            switch_threshold: routing.switch_threshold,
            clarify_threshold: routing.clarify_threshold,
            stick_threshold: routing.stick_threshold,
            short_input_max_words: routing.short_input_max_words,
        }
    }

    pub fn decide(
        &self,
        state: &ConversationState,
        text: &str,
        resolved: &IntentResult,
    ) -> ContinuityOutcome {
        let new_domain = resolved.intent_type.domain();
        // The general domain is not a topic worth holding on to.
        let active = match state.active_domain {
            Some(domain) if domain != AgentDomain::General => domain,
            _ => return switch(ContinuityReason::NoActiveDomain, resolved),
        };

        let folded = text.trim().to_lowercase();
        if has_switch_marker(&folded) {
            return switch(ContinuityReason::ExplicitSwitchMarker, resolved);
        }

        if folded.split_whitespace().count() <= self.short_input_max_words {
            return stick(ContinuityReason::ShortInput, active, state, resolved);
        }
        if is_refinement(&folded, active) {
            return stick(ContinuityReason::RefinementPhrase, active, state, resolved);
        }

        let confidence = resolved.confidence;
        if confidence >= self.switch_threshold {
            return switch(ContinuityReason::HighConfidence, resolved);
        }
        if confidence <= self.stick_threshold {
            return stick(ContinuityReason::LowConfidence, active, state, resolved);
        }
        if confidence <= self.clarify_threshold {
            return ContinuityOutcome {
                decision: ContinuityDecision::Clarify,
                reason: ContinuityReason::AmbiguousConfidence,
                domain: active,
                effective_intent: resolved.intent_type,
                clarification: Some(clarifying_question(active, new_domain)),
            };
        }
        if new_domain == active {
            return stick(ContinuityReason::SameDomainBias, active, state, resolved);
        }
        switch(ContinuityReason::DefaultSwitch, resolved)
    }
}

fn switch(reason: ContinuityReason, resolved: &IntentResult) -> ContinuityOutcome {
    ContinuityOutcome {
        decision: ContinuityDecision::Switch,
        reason,
        domain: resolved.intent_type.domain(),
        effective_intent: resolved.intent_type,
        clarification: None,
    }
}

fn stick(
    reason: ContinuityReason,
    active: AgentDomain,
    state: &ConversationState,
    resolved: &IntentResult,
) -> ContinuityOutcome {
    let effective_intent = if resolved.intent_type.domain() == active {
        resolved.intent_type
    } else {
        match state.last_intent {
            Some(last) if last.is_repeatable() => last,
            _ => IntentType::GeneralChat,
        }
    };
    ContinuityOutcome {
        decision: ContinuityDecision::Stick,
        reason,
        domain: active,
        effective_intent,
        clarification: None,
    }
}

fn has_switch_marker(folded: &str) -> bool {
    SWITCH_MARKERS.iter().any(|marker| {
        folded.match_indices(marker).any(|(start, _)| {
            let end = start + marker.len();
            let before = folded[..start].chars().next_back();
            let after = folded[end..].chars().next();
            before.map_or(true, |c| !c.is_alphanumeric())
                && after.map_or(true, |c| !c.is_alphanumeric())
        })
    })
}

fn is_refinement(folded: &str, active: AgentDomain) -> bool {
    if REFINEMENT_OPENERS.iter().any(|opener| folded.starts_with(opener)) {
        return true;
    }
    if active != AgentDomain::RealEstate {
        return false;
    }
    SEARCH_REFINEMENTS.iter().any(|phrase| folded.contains(phrase))
        || ((folded.starts_with("in ") || folded.contains(" in ")) && is_known_location(folded))
}

fn topic(domain: AgentDomain) -> &'static str {
    match domain {
        AgentDomain::RealEstate => "your property search",
        AgentDomain::Knowledge => "your question about living in North Cyprus",
        AgentDomain::General => "something else",
    }
}

fn clarifying_question(active: AgentDomain, new_domain: AgentDomain) -> String {
    if active == new_domain {
        return format!(
            "Just to make sure I understand: is this about {}? Could you tell me a bit more?",
            topic(active)
        );
    }
    format!(
        "Just to check: should we carry on with {} or move on to {}?",
        topic(active),
        topic(new_domain)
    )
}

#[cfg(test)]
mod tests {
    use concierge_core::domain::conversation::ConversationState;
    use concierge_core::domain::intent::{AgentDomain, IntentResult, IntentSource, IntentType};

    use super::{ContinuityDecision, ContinuityPolicy, ContinuityReason};

    fn state(domain: Option<AgentDomain>, last_intent: Option<IntentType>) -> ConversationState {
        ConversationState { active_domain: domain, last_intent, ..ConversationState::default() }
    }

    fn intent(intent_type: IntentType, confidence: f32) -> IntentResult {
        IntentResult::with_default_tool(intent_type, confidence, IntentSource::Llm).expect("valid")
    }

    #[test]
    fn fresh_conversation_switches() {
        let outcome = ContinuityPolicy::default().decide(
            &state(None, None),
            "hello there",
            &intent(IntentType::GeneralChat, 0.4),
        );
        assert_eq!(outcome.decision, ContinuityDecision::Switch);
        assert_eq!(outcome.reason, ContinuityReason::NoActiveDomain);
        assert_eq!(outcome.domain, AgentDomain::General);
    }

    #[test]
    fn explicit_marker_switches_away_from_real_estate() {
        let outcome = ContinuityPolicy::default().decide(
            &state(Some(AgentDomain::RealEstate), Some(IntentType::PropertySearch)),
            "actually show me cars",
            &intent(IntentType::GeneralChat, 0.4),
        );
        assert_eq!(outcome.decision, ContinuityDecision::Switch);
        assert!(outcome.describe().contains("explicit_switch_marker"));
        assert_eq!(outcome.domain, AgentDomain::General);
    }

    #[test]
    fn short_input_after_search_sticks_to_real_estate() {
        let outcome = ContinuityPolicy::default().decide(
            &state(Some(AgentDomain::RealEstate), Some(IntentType::PropertySearch)),
            "hmm, cheaper?",
            &intent(IntentType::GeneralChat, 0.4),
        );
        assert_eq!(outcome.decision, ContinuityDecision::Stick);
        assert_eq!(outcome.reason, ContinuityReason::ShortInput);
        assert_eq!(outcome.domain, AgentDomain::RealEstate);
        assert_eq!(outcome.effective_intent, IntentType::PropertySearch);
    }

    #[test]
    fn stick_keeps_new_intent_when_it_belongs_to_active_domain() {
        let outcome = ContinuityPolicy::default().decide(
            &state(Some(AgentDomain::RealEstate), Some(IntentType::PropertySearch)),
            "contact listing 5",
            &intent(IntentType::AgentOutreach, 0.95),
        );
        assert_eq!(outcome.reason, ContinuityReason::ShortInput);
        assert_eq!(outcome.effective_intent, IntentType::AgentOutreach);
    }

    #[test]
    fn stick_without_repeatable_history_becomes_general_chat() {
        let outcome = ContinuityPolicy::default().decide(
            &state(Some(AgentDomain::RealEstate), Some(IntentType::AgentOutreach)),
            "thanks a lot",
            &intent(IntentType::GeneralChat, 0.4),
        );
        assert_eq!(outcome.decision, ContinuityDecision::Stick);
        assert_eq!(outcome.effective_intent, IntentType::GeneralChat);
    }

    #[test]
    fn location_refinement_sticks() {
        let outcome = ContinuityPolicy::default().decide(
            &state(Some(AgentDomain::RealEstate), Some(IntentType::PropertySearch)),
            "could you look in Alsancak as well",
            &intent(IntentType::KnowledgeQuery, 0.6),
        );
        assert_eq!(outcome.reason, ContinuityReason::RefinementPhrase);
        assert_eq!(outcome.effective_intent, IntentType::PropertySearch);
    }

    #[test]
    fn confidence_bands() {
        let policy = ContinuityPolicy::default();
        let active = state(Some(AgentDomain::Knowledge), Some(IntentType::KnowledgeQuery));
        let text = "I would like to see some flats near the university";

        let high = policy.decide(&active, text, &intent(IntentType::PropertySearch, 0.9));
        assert_eq!(high.reason, ContinuityReason::HighConfidence);
        assert_eq!(high.domain, AgentDomain::RealEstate);

        let low = policy.decide(&active, text, &intent(IntentType::PropertySearch, 0.2));
        assert_eq!(low.reason, ContinuityReason::LowConfidence);
        assert_eq!(low.effective_intent, IntentType::KnowledgeQuery);

        let ambiguous = policy.decide(&active, text, &intent(IntentType::PropertySearch, 0.45));
        assert_eq!(ambiguous.decision, ContinuityDecision::Clarify);
        assert_eq!(ambiguous.reason, ContinuityReason::AmbiguousConfidence);
        assert!(ambiguous.clarification.expect("question").contains("property search"));

        let same = policy.decide(&active, text, &intent(IntentType::KnowledgeQuery, 0.7));
        assert_eq!(same.reason, ContinuityReason::SameDomainBias);

        let other = policy.decide(&active, text, &intent(IntentType::PropertySearch, 0.7));
        assert_eq!(other.reason, ContinuityReason::DefaultSwitch);
    }

    #[test]
    fn general_domain_is_not_sticky() {
        let outcome = ContinuityPolicy::default().decide(
            &state(Some(AgentDomain::General), Some(IntentType::GeneralChat)),
            "2+1 in Girne",
            &intent(IntentType::PropertySearch, 0.9),
        );
        assert_eq!(outcome.decision, ContinuityDecision::Switch);
        assert_eq!(outcome.effective_intent, IntentType::PropertySearch);
    }
}
