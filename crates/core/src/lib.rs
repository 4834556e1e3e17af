pub mod clock;
pub mod config;
pub mod contact;
pub mod domain;
pub mod errors;
pub mod language;
pub mod location;
pub mod messaging;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::conversation::{
    ConversationId, ConversationState, PendingAction, PendingActionKind, PendingStatus,
};
pub use domain::intent::{AgentDomain, IntentResult, IntentSource, IntentType, ToolName};
pub use domain::listing::{ContactInfo, Listing, ListingId, ListingType, StructuredData};
pub use domain::requirements::SearchRequirements;
pub use domain::response::{ChatResponse, RecommendationCard};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use language::Language;
pub use messaging::{MessagingError, MessagingGateway, OutboundMessage, SendReceipt};
