pub mod connection;
pub mod conversation;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use conversation::{
    ConversationStore, ConversationStoreError, FallbackConversationStore,
    InMemoryConversationStore, SqlConversationStore,
};
pub use fixtures::{DemoSeedDataset, SeedResult, VerificationResult};
