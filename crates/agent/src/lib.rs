//! Agent Runtime - intent routing and orchestration
//!
//! This crate is the routing core of the concierge. For every user turn it:
//! - Classifies the message with keyword heuristics and an LLM (`heuristics`, `intent_parser`)
//! - Merges both into one intent through ordered rules (`resolver`)
//! - Applies topic hysteresis so short follow-ups stay on topic (`continuity`)
//! - Runs exactly one handler (`dispatcher`, `handlers`)
//! - Persists the updated conversation state and assistant message (`runtime`)
//!
//! # Architecture
//!
//! 1. **Classification** - `HeuristicSignals` + `IntentParser`
//! 2. **Resolution** - `IntentResolver` reports which rule fired
//! 3. **Continuity** - `ContinuityPolicy` decides stick / switch / clarify
//! 4. **Dispatch** - a closed `Action` enum, one handler per variant
//! 5. **Persistence** - versioned `ConversationStore` save with one conflict retry
//!
//! # Safety Principle
//!
//! The LLM labels and phrases; it never decides which listing gets contacted.
//! Outreach targets, search filters and pending-action status are resolved
//! deterministically from the text, the stored state and the listing data.

pub mod continuity;
pub mod conversation;
pub mod dispatcher;
pub mod handlers;
pub mod heuristics;
pub mod intent_parser;
pub mod llm;
pub mod pending;
pub mod requirements;
pub mod resolver;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use dispatcher::{Action, Dispatcher};
pub use handlers::HandlerServices;
pub use llm::{build_llm_client, LlmClient, LlmError};
pub use runtime::{AgentRuntime, RuntimeSettings, TurnTrace};
