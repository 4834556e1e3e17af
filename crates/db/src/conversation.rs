//! Per-conversation routing state with optimistic concurrency.
//!
//! Every save carries the version that was loaded. The store bumps it on
//! success and reports [`ConversationStoreError::VersionConflict`] when another
//! writer got there first. Expired rows behave as if they were absent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use concierge_core::clock::{Clock, SystemClock};
use concierge_core::domain::conversation::{ConversationId, ConversationState};

use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Debug, Error)]
pub enum ConversationStoreError {
    #[error("conversation `{conversation_id}` was saved concurrently (expected version {expected}, found {actual})")]
    VersionConflict { conversation_id: ConversationId, expected: u64, actual: u64 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for ConversationStoreError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Current state, or a fresh default (version 0) when absent or expired.
    async fn load(&self, id: &ConversationId) -> Result<ConversationState, ConversationStoreError>;

    /// Persists `state` if `state.version` still matches and returns the new version.
    async fn save(
        &self,
        id: &ConversationId,
        state: &ConversationState,
    ) -> Result<u64, ConversationStoreError>;
}

const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn ttl_duration(ttl_secs: u64) -> Duration {
    Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64)
}

pub struct SqlConversationStore {
    pool: DbPool,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool, ttl_secs: u64) -> Self {
        Self { pool, ttl: ttl_duration(ttl_secs), clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn current_version(&self, id: &ConversationId, now: i64) -> Result<u64, sqlx::Error> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM conversation_state WHERE conversation_id = ? AND expires_at > ?",
        )
        .bind(&id.0)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(version.map(|v| v.max(0) as u64).unwrap_or(0))
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<ConversationState, ConversationStoreError> {
        let now = self.clock.now().timestamp();
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT state_json, version FROM conversation_state
             WHERE conversation_id = ? AND expires_at > ?",
        )
        .bind(&id.0)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some((state_json, version)) = row else {
            return Ok(ConversationState::default());
        };

        let mut state: ConversationState = serde_json::from_str(&state_json).map_err(|e| {
            RepositoryError::Decode(format!("invalid conversation state for `{id}`: {e}"))
        })?;
        state.version = version.max(0) as u64;
        Ok(state)
    }

    async fn save(
        &self,
        id: &ConversationId,
        state: &ConversationState,
    ) -> Result<u64, ConversationStoreError> {
        let now = self.clock.now();
        let now_secs = now.timestamp();
        let expires_at = (now + self.ttl).timestamp();
        let expected = state.version;
        let state_json =
            serde_json::to_string(state).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let expected_sql = i64::try_from(expected).unwrap_or(i64::MAX);

        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE conversation_state
             SET state_json = ?1, version = version + 1, updated_at = ?2, expires_at = ?3
             WHERE conversation_id = ?4
               AND ((expires_at > ?5 AND version = ?6) OR (expires_at <= ?5 AND ?6 = 0))
             RETURNING version",
        )
        .bind(&state_json)
        .bind(now.to_rfc3339())
        .bind(expires_at)
        .bind(&id.0)
        .bind(now_secs)
        .bind(expected_sql)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(version) = updated {
            return Ok(version.max(0) as u64);
        }

        if expected == 0 {
            let inserted: Option<i64> = sqlx::query_scalar(
                "INSERT INTO conversation_state (conversation_id, state_json, version, updated_at, expires_at)
                 VALUES (?, ?, 1, ?, ?)
                 ON CONFLICT(conversation_id) DO NOTHING
                 RETURNING version",
            )
            .bind(&id.0)
            .bind(&state_json)
            .bind(now.to_rfc3339())
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(version) = inserted {
                return Ok(version.max(0) as u64);
            }
        }

        let actual = self.current_version(id, now_secs).await?;
        Err(ConversationStoreError::VersionConflict {
            conversation_id: id.clone(),
            expected,
            actual,
        })
    }
}

struct StoredState {
    state: ConversationState,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryConversationStore {
    states: RwLock<HashMap<String, StoredState>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new(6 * 60 * 60)
    }
}

impl InMemoryConversationStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            ttl: ttl_duration(ttl_secs),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<ConversationState, ConversationStoreError> {
        let now = self.clock.now();
        let states = self.states.read().await;
        Ok(states
            .get(&id.0)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.state.clone())
            .unwrap_or_default())
    }

    async fn save(
        &self,
        id: &ConversationId,
        state: &ConversationState,
    ) -> Result<u64, ConversationStoreError> {
        let now = self.clock.now();
        let mut states = self.states.write().await;

        let current = states
            .get(&id.0)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.state.version)
            .unwrap_or(0);
        if current != state.version {
            return Err(ConversationStoreError::VersionConflict {
                conversation_id: id.clone(),
                expected: state.version,
                actual: current,
            });
        }

        let mut next = state.clone();
        next.version = current + 1;
        let version = next.version;
        states.insert(id.0.clone(), StoredState { state: next, expires_at: now + self.ttl });
        Ok(version)
    }
}

/// Uses `primary` while it is healthy and degrades to an in-process store when
/// it reports a backend failure. Version conflicts are never masked.
pub struct FallbackConversationStore {
    primary: Arc<dyn ConversationStore>,
    fallback: InMemoryConversationStore,
}

impl FallbackConversationStore {
    pub fn new(primary: Arc<dyn ConversationStore>, fallback: InMemoryConversationStore) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl ConversationStore for FallbackConversationStore {
    async fn load(&self, id: &ConversationId) -> Result<ConversationState, ConversationStoreError> {
        match self.primary.load(id).await {
            Err(ConversationStoreError::Repository(error)) => {
                tracing::warn!(
                    event_name = "conversation_store.degraded",
                    conversation_id = %id,
                    operation = "load",
                    error = %error,
                    "primary conversation store failed, using in-process state"
                );
                self.fallback.load(id).await
            }
            other => other,
        }
    }

    async fn save(
        &self,
        id: &ConversationId,
        state: &ConversationState,
    ) -> Result<u64, ConversationStoreError> {
        match self.primary.save(id, state).await {
            Err(ConversationStoreError::Repository(error)) => {
                tracing::warn!(
                    event_name = "conversation_store.degraded",
                    conversation_id = %id,
                    operation = "save",
                    error = %error,
                    "primary conversation store failed, using in-process state"
                );
                self.fallback.save(id, state).await
            }
            other => other,
        }
    }
}
