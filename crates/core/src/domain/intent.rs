use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::language::Language;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    PropertySearch,
    AgentOutreach,
    StatusUpdate,
    KnowledgeQuery,
    ConversationContinuation,
    FollowUp,
    GeneralChat,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PropertySearch => "property_search",
            Self::AgentOutreach => "agent_outreach",
            Self::StatusUpdate => "status_update",
            Self::KnowledgeQuery => "knowledge_query",
            Self::ConversationContinuation => "conversation_continuation",
            Self::FollowUp => "follow_up",
            Self::GeneralChat => "general_chat",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "property_search" => Some(Self::PropertySearch),
            "agent_outreach" => Some(Self::AgentOutreach),
            "status_update" => Some(Self::StatusUpdate),
            "knowledge_query" => Some(Self::KnowledgeQuery),
            "conversation_continuation" => Some(Self::ConversationContinuation),
            "follow_up" => Some(Self::FollowUp),
            "general_chat" => Some(Self::GeneralChat),
            _ => None,
        }
    }

    /// Labels too vague to trust on their own; heuristics may override them.
    pub fn is_generic(&self) -> bool {
        matches!(self, Self::GeneralChat | Self::ConversationContinuation | Self::FollowUp)
    }

    /// Intents whose handler can safely be re-run on a refinement turn.
    pub fn is_repeatable(&self) -> bool {
        matches!(self, Self::PropertySearch | Self::KnowledgeQuery)
    }

    pub fn domain(&self) -> AgentDomain {
        match self {
            Self::PropertySearch | Self::AgentOutreach | Self::StatusUpdate => {
                AgentDomain::RealEstate
            }
            Self::KnowledgeQuery => AgentDomain::Knowledge,
            Self::ConversationContinuation | Self::FollowUp | Self::GeneralChat => {
                AgentDomain::General
            }
        }
    }

    pub fn default_tool(&self) -> Option<ToolName> {
        match self {
            Self::PropertySearch => Some(ToolName::SearchListings),
            Self::AgentOutreach => Some(ToolName::InitiateContactWithSeller),
            Self::StatusUpdate => Some(ToolName::CheckOutreachStatus),
            Self::KnowledgeQuery => Some(ToolName::SearchKnowledgeBase),
            Self::ConversationContinuation | Self::FollowUp | Self::GeneralChat => None,
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    SearchListings,
    InitiateContactWithSeller,
    CheckOutreachStatus,
    SearchKnowledgeBase,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchListings => "search_listings",
            Self::InitiateContactWithSeller => "initiate_contact_with_seller",
            Self::CheckOutreachStatus => "check_outreach_status",
            Self::SearchKnowledgeBase => "search_knowledge_base",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "search_listings" => Some(Self::SearchListings),
            "initiate_contact_with_seller" => Some(Self::InitiateContactWithSeller),
            "check_outreach_status" => Some(Self::CheckOutreachStatus),
            "search_knowledge_base" => Some(Self::SearchKnowledgeBase),
            _ => None,
        }
    }
}

/// The sticky topic a conversation is currently anchored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentDomain {
    #[serde(rename = "real_estate_agent")]
    RealEstate,
    #[serde(rename = "knowledge_agent")]
    Knowledge,
    #[serde(rename = "general_agent")]
    General,
}

impl AgentDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RealEstate => "real_estate_agent",
            Self::Knowledge => "knowledge_agent",
            Self::General => "general_agent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "real_estate_agent" => Some(Self::RealEstate),
            "knowledge_agent" => Some(Self::Knowledge),
            "general_agent" => Some(Self::General),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Llm,
    Heuristic,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent_type: IntentType,
    pub confidence: f32,
    pub needs_tool: bool,
    pub tool_name: Option<ToolName>,
    pub language: Option<Language>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub reasoning: Option<String>,
    pub source: IntentSource,
}

impl IntentResult {
    /// Builds a validated result. `needs_tool` without a tool, or a confidence
    /// outside `[0, 1]`, is rejected rather than repaired.
    pub fn new(
        intent_type: IntentType,
        confidence: f32,
        needs_tool: bool,
        tool_name: Option<ToolName>,
        source: IntentSource,
    ) -> Result<Self, DomainError> {
        let result = Self {
            intent_type,
            confidence,
            needs_tool,
            tool_name,
            language: None,
            category: None,
            subcategory: None,
            reasoning: None,
            source,
        };
        result.validate()?;
        Ok(result)
    }

    /// Result carrying the intent's default tool, used by heuristic overrides.
    pub fn with_default_tool(
        intent_type: IntentType,
        confidence: f32,
        source: IntentSource,
    ) -> Result<Self, DomainError> {
        let tool_name = intent_type.default_tool();
        Self::new(intent_type, confidence, tool_name.is_some(), tool_name, source)
    }

    /// What the LLM parser hands back when it could not produce anything usable.
    pub fn fallback() -> Self {
        Self {
            intent_type: IntentType::GeneralChat,
            confidence: 0.0,
            needs_tool: false,
            tool_name: None,
            language: None,
            category: None,
            subcategory: None,
            reasoning: Some("llm_unavailable".to_string()),
            source: IntentSource::Fallback,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=1.0).contains(&self.confidence) || self.confidence.is_nan() {
            return Err(DomainError::InvalidIntent(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        if self.needs_tool && self.tool_name.is_none() {
            return Err(DomainError::InvalidIntent(format!(
                "intent `{}` needs a tool but no tool_name was given",
                self.intent_type
            )));
        }
        Ok(())
    }

    pub fn is_fallback(&self) -> bool {
        self.source == IntentSource::Fallback
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Shape the LLM is asked to emit. Kept loose so that a schema violation is
/// reported as a validation failure instead of a decode error.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct IntentPayload {
    pub intent_type: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub needs_tool: bool,
    pub tool_name: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub reasoning: Option<String>,
}

impl TryFrom<IntentPayload> for IntentResult {
    type Error = DomainError;

    fn try_from(payload: IntentPayload) -> Result<Self, Self::Error> {
        let label = payload
            .intent_type
            .ok_or_else(|| DomainError::InvalidIntent("intent_type is missing".to_string()))?;
        let intent_type = IntentType::parse(&label)
            .ok_or_else(|| DomainError::InvalidIntent(format!("unknown intent_type `{label}`")))?;

        let confidence = payload
            .confidence
            .ok_or_else(|| DomainError::InvalidIntent("confidence is missing".to_string()))?;

        let tool_name = match payload.tool_name.as_deref().map(str::trim) {
            None | Some("") | Some("null") => None,
            Some(name) => Some(
                ToolName::parse(name)
                    .ok_or_else(|| DomainError::InvalidIntent(format!("unknown tool `{name}`")))?,
            ),
        };

        let mut result = Self::new(
            intent_type,
            confidence as f32,
            payload.needs_tool,
            tool_name,
            IntentSource::Llm,
        )?;
        result.language = payload.language.as_deref().and_then(Language::from_code);
        result.category = payload.category;
        result.subcategory = payload.subcategory;
        result.reasoning = payload.reasoning;
        Ok(result)
    }
}
