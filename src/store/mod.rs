pub mod sqlite;

pub use sqlite::SqliteTradeStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::PersistedTrade;

/// Result of one batch submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: bool,
    pub count: usize,
    pub duplicates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl BatchOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            duplicates: 0,
            error: Some(reason.into()),
            batch_id: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Storage task failed: {0}")]
    TaskFailed(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::TaskFailed(err.to_string())
    }
}

/// Persistence collaborator receiving whole import batches
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Store every record for `user_id`. Records whose position already
    /// exists for that user are skipped and counted as duplicates.
    async fn submit_batch(&self, user_id: &str, trades: &[PersistedTrade]) -> Result<BatchOutcome, StoreError>;
}
