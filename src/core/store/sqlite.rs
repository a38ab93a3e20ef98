use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{RetryPolicy, RowSet, SqlStore, StoreError};
use crate::core::sql::gate;
use crate::core::sql::types::{SchemaSnapshot, SqlRow};

const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Read-only view over the movie database file.
///
/// Every call opens a fresh connection so a database swapped on disk by the
/// import job is picked up without a restart.
pub struct SqliteStore {
    db_path: PathBuf,
    retry: RetryPolicy,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P, retry: RetryPolicy) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            retry,
        }
    }

    async fn with_retry<T, F>(&self, label: &'static str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Fn(&Connection) -> rusqlite::Result<T> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        let mut attempt: u32 = 0;
        loop {
            let path = self.db_path.clone();
            let op = Arc::clone(&op);
            let outcome = tokio::task::spawn_blocking(move || {
                let conn = open_read_only(&path)?;
                op(&conn)
            })
            .await
            .map_err(|e| StoreError::Unavailable(format!("store worker failed: {}", e)))?;

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < self.retry.retries => {
                    attempt += 1;
                    warn!(
                        "SQLite {} transient failure (attempt {}/{}): {}",
                        label, attempt, self.retry.retries, e
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(e) if is_transient(&e) => {
                    return Err(StoreError::Unavailable(format!(
                        "{} failed after {} retries: {}",
                        label, self.retry.retries, e
                    )));
                }
                Err(e) => return Err(StoreError::Query(e.to_string())),
            }
        }
    }
}

fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "query_only", "ON")?;
    Ok(conn)
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn introspect(conn: &Connection) -> rusqlite::Result<SchemaSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut schema = SchemaSnapshot::new();
    for table in tables {
        let columns = table_columns(conn, &table).unwrap_or_else(|e| {
            warn!("table_info failed for {}: {}", table, e);
            Vec::new()
        });
        schema.insert(table, columns);
    }
    Ok(schema)
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

fn select_rows(conn: &Connection, sql: &str, max_rows: usize) -> rusqlite::Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while rows.len() < max_rows {
        let Some(row) = cursor.next()? else {
            break;
        };
        let mut record = SqlRow::new();
        for (idx, name) in columns.iter().enumerate() {
            record.insert(name.clone(), sqlite_value_to_json(row.get_ref(idx)?));
        }
        rows.push(record);
    }
    Ok(RowSet { columns, rows })
}

fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

#[async_trait]
impl SqlStore for SqliteStore {
    async fn introspect_schema(&self) -> Result<SchemaSnapshot, StoreError> {
        let schema = self.with_retry("introspect", introspect).await?;
        debug!("Introspected {} tables from {}", schema.len(), self.db_path.display());
        Ok(schema)
    }

    async fn run_select(&self, sql: &str, max_rows: usize) -> Result<RowSet, StoreError> {
        let sql = gate::validate(sql).map_err(|_| StoreError::Rejected)?;
        if max_rows == 0 {
            return Ok(RowSet {
                columns: Vec::new(),
                rows: Vec::new(),
            });
        }
        self.with_retry("select", move |conn| select_rows(conn, &sql, max_rows))
            .await
    }
}
