use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row, keyed by column name in select-list order.
pub type SqlRow = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single message of the caller-owned chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    #[serde(rename = "content")]
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    #[cfg(test)]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }
}

/// Table name -> ordered column names, as introspected from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot(BTreeMap<String, Vec<String>>);

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_table<I, S>(mut self, table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(table, columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn insert(&mut self, table: impl Into<String>, columns: Vec<String>) {
        self.0.insert(table.into(), columns);
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    #[cfg(test)]
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.0.get(table).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for SchemaSnapshot {
    /// Renders one `table(col, col, ...)` line per table.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (table, columns) in &self.0 {
            writeln!(f, "{}({})", table, columns.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Generated,
    Repaired,
}

/// A not-yet-validated SQL statement proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlCandidate {
    pub text: String,
    pub origin: CandidateOrigin,
}

impl SqlCandidate {
    /// Trims the text and strips at most one trailing statement terminator.
    pub fn new(text: &str, origin: CandidateOrigin) -> Self {
        Self {
            text: strip_terminator(text).to_string(),
            origin,
        }
    }

    pub fn empty(origin: CandidateOrigin) -> Self {
        Self {
            text: String::new(),
            origin,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

pub(crate) fn strip_terminator(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

/// Failures recovered inside the agent. None of these reach the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("{0}")]
    ValidationRejected(String),
    #[error("no SQL query was provided")]
    EmptyCandidate,
    #[error("{0}")]
    Store(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("gave up after {attempts} repair attempts")]
    AttemptsExhausted { attempts: usize },
}

impl AgentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ValidationRejected(_) => "validation_rejected",
            AgentError::EmptyCandidate => "empty_candidate",
            AgentError::Store(_) => "store_failure",
            AgentError::Timeout(_) => "timeout",
            AgentError::AttemptsExhausted { .. } => "attempts_exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Success {
        columns: Vec<String>,
        rows: Vec<SqlRow>,
        truncated: bool,
    },
    Failure(AgentError),
}

impl QueryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success { .. })
    }

    pub fn failure(&self) -> Option<&AgentError> {
        match self {
            QueryResult::Failure(err) => Some(err),
            QueryResult::Success { .. } => None,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Success { rows, .. } => rows.len(),
            QueryResult::Failure(_) => 0,
        }
    }

    /// Compact JSON form used for progress events.
    pub fn to_event_json(&self) -> Value {
        match self {
            QueryResult::Success {
                columns,
                rows,
                truncated,
            } => serde_json::json!({
                "success": true,
                "columns": columns,
                "row_count": rows.len(),
                "truncated": truncated,
            }),
            QueryResult::Failure(err) => serde_json::json!({
                "success": false,
                "kind": err.kind(),
                "message": err.to_string(),
            }),
        }
    }
}
