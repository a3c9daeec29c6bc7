//! Storage collaborator seam
//!
//! The engine reads subject state through [`CareStore`] and writes back
//! through published events. The one synchronous write is
//! [`CareStore::record_score`], which must be an atomic create so two
//! submissions for the same day cannot both succeed.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{BadgeState, Directive, FeatureId, Recommendation, ScoreRecord};

pub use memory::{MemoryStore, StoreSnapshot};

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a store
pub type SharedStore = Arc<dyn CareStore>;

/// Reads the engine needs from the storage collaborator
#[async_trait]
pub trait CareStore: Send + Sync {
    /// Active directives for a subject
    async fn active_directives(&self, subject_id: &str) -> StoreResult<Vec<Directive>>;

    /// Up to `limit` most recent score records, newest first
    async fn recent_scores(&self, subject_id: &str, limit: usize)
        -> StoreResult<Vec<ScoreRecord>>;

    /// Every badge state recorded for a subject
    async fn badge_states(&self, subject_id: &str) -> StoreResult<Vec<BadgeState>>;

    async fn last_recommendation(&self, subject_id: &str) -> StoreResult<Option<Recommendation>>;

    /// Authoritative cumulative count of a feature's uses
    async fn feature_usage_count(&self, subject_id: &str, feature: &FeatureId)
        -> StoreResult<u64>;

    /// Create the record for its (subject, date); `Conflict` if one exists
    async fn record_score(&self, record: ScoreRecord) -> StoreResult<()>;
}
