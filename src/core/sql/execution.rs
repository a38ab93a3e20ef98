use std::time::Duration;
use tracing::{info, warn};

use super::gate;
use super::types::{AgentError, QueryResult, SqlCandidate};
use crate::core::store::SqlStore;

/// Run `candidate` through the gate and the store.
///
/// Never returns an error: every failure is folded into
/// [`QueryResult::Failure`]. Empty or rejected candidates do not reach the
/// store.
pub async fn execute(
    store: &dyn SqlStore,
    candidate: &SqlCandidate,
    max_rows: usize,
    store_timeout: Duration,
) -> QueryResult {
    if candidate.is_empty() {
        return QueryResult::Failure(AgentError::EmptyCandidate);
    }

    let sql = match gate::validate(&candidate.text) {
        Ok(sql) => sql,
        Err(rejection) => {
            warn!(
                "Gate rejected {:?} candidate: {}",
                candidate.origin, rejection.reason
            );
            return QueryResult::Failure(AgentError::ValidationRejected(rejection.reason));
        }
    };

    match tokio::time::timeout(store_timeout, store.run_select(&sql, max_rows)).await {
        Ok(Ok(set)) => {
            let truncated = set.rows.len() == max_rows;
            info!(
                "Query returned {} rows (truncated={})",
                set.rows.len(),
                truncated
            );
            QueryResult::Success {
                columns: set.columns,
                rows: set.rows,
                truncated,
            }
        }
        Ok(Err(e)) => {
            warn!("Query failed: {}", e);
            QueryResult::Failure(AgentError::Store(e.to_string()))
        }
        Err(_) => {
            warn!("Query timed out after {:?}", store_timeout);
            QueryResult::Failure(AgentError::Timeout(store_timeout))
        }
    }
}
