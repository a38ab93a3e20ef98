//! Read-only gate in front of the store.
//!
//! This is a leading-keyword check, not a SQL parser. A statement such as
//! `SELECT 1; DROP TABLE movies` passes the gate; single-statement
//! enforcement is left to the store's `prepare` (see DESIGN.md).

use super::types::strip_terminator;

pub const REJECT_NOT_SELECT: &str = "not a SELECT";

const SELECT_KEYWORD: &str = "select";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct GateRejection {
    pub reason: String,
}

/// Normalize `sql` and accept it only if it starts with `SELECT`.
pub fn validate(sql: &str) -> Result<String, GateRejection> {
    let normalized = strip_terminator(sql);
    if !is_select(normalized) {
        return Err(GateRejection {
            reason: REJECT_NOT_SELECT.to_string(),
        });
    }
    Ok(normalized.to_string())
}

/// Case-insensitive `SELECT` prefix test on already-trimmed text.
pub fn is_select(sql: &str) -> bool {
    sql.get(..SELECT_KEYWORD.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(SELECT_KEYWORD))
}
