#[cfg(test)]
pub(crate) mod fixtures;
mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::core::sql::types::{SchemaSnapshot, SqlRow};

#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<SqlRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Only SELECT queries are allowed.")]
    Rejected,
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Query(String),
}

/// Bounded retry with a fixed sleep between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

#[async_trait]
pub trait SqlStore: Send + Sync {
    async fn introspect_schema(&self) -> Result<SchemaSnapshot, StoreError>;

    /// Run a read-only statement and return at most `max_rows` rows.
    async fn run_select(&self, sql: &str, max_rows: usize) -> Result<RowSet, StoreError>;
}
