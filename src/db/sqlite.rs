//! SQLite-backed [`SqlConnection`]

use crate::db::{DriverError, DriverValue, RowSet, SqlConnection};
use crate::error::{BalancerError, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

/// How long a call waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bind-parameter ceiling SQLite is compiled with (3.32 and later)
pub const SQLITE_MAX_VARIABLE_NUMBER: usize = 32766;

/// A single SQLite connection shared across request threads
pub struct SqliteConnection {
    conn: Mutex<Connection>,
}

impl SqliteConnection {
    /// Open (or create) the database file at `path`. `:memory:` opens a
    /// private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| BalancerError::storage("open", path.display().to_string(), e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| BalancerError::storage("open", path.display().to_string(), e))?;

        info!("Opened SQLite database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BalancerError::storage("open", ":memory:", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::result::Result<MutexGuard<'_, Connection>, DriverError> {
        self.conn.lock().map_err(|_| DriverError::Poisoned)
    }
}

impl SqlConnection for SqliteConnection {
    fn execute(&self, sql: &str, args: &[serde_json::Value]) -> std::result::Result<usize, DriverError> {
        debug!(sql, args = args.len(), "executing statement");
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(sql_error)?;
        stmt.execute(rusqlite::params_from_iter(args.iter().map(to_sql_value)))
            .map_err(sql_error)
    }

    fn query(&self, sql: &str) -> std::result::Result<RowSet, DriverError> {
        debug!(sql, "running query");
        let conn = self.lock()?;
        // Prepared so that every column reports its declared type
        let mut stmt = conn.prepare(sql).map_err(sql_error)?;
        if !stmt.readonly() {
            return Err(DriverError::NotReadOnly);
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query([]).map_err(sql_error)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(sql_error)? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                let value = match row.get_ref(index).map_err(sql_error)? {
                    ValueRef::Null => DriverValue::Null,
                    ValueRef::Integer(i) => DriverValue::Integer(i),
                    ValueRef::Real(f) => DriverValue::Real(f),
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => DriverValue::Bytes(bytes.to_vec()),
                };
                values.push(value);
            }
            out.push(values);
        }

        Ok(RowSet { columns, rows: out })
    }

    fn max_bind_parameters(&self) -> usize {
        SQLITE_MAX_VARIABLE_NUMBER
    }
}

fn sql_error(err: rusqlite::Error) -> DriverError {
    DriverError::Sql(err.to_string())
}

/// Bind a decoded JSON value as a SQLite value
fn to_sql_value(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
