//! Relational storage layer
//!
//! Maps caller-supplied event families onto dynamically created tables and
//! exposes a read-only query surface over them. Everything here talks to the
//! database through [`SqlConnection`], so tests can inject a recording mock in
//! place of the SQLite connection.

pub mod classify;
pub mod gateway;
pub mod registry;
pub mod sqlite;
pub mod statements;

#[cfg(test)]
pub(crate) mod mock;

pub use classify::{Classification, QueryClassifier, SqlParserClassifier};
pub use gateway::{ColumnDescription, QueryGateway, QueryResult, TableDescription};
pub use registry::{StorageMode, Table, TableRegistry};
pub use sqlite::SqliteConnection;

use thiserror::Error;

/// Failure reported by a connection, before the caller adds operation context
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("{0}")]
    Sql(String),

    #[error("statement is not read-only")]
    NotReadOnly,

    #[error("connection lock poisoned")]
    Poisoned,
}

/// A single cell as the driver hands it back
#[derive(Debug, Clone, PartialEq)]
pub enum DriverValue {
    Null,
    Integer(i64),
    Real(f64),
    /// Text and blob columns both surface as raw bytes
    Bytes(Vec<u8>),
}

/// Column names plus rows in driver representation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<DriverValue>>,
}

/// Blocking relational connection shared by concurrent requests
pub trait SqlConnection: Send + Sync {
    /// Execute a statement with positional arguments; returns rows affected
    fn execute(&self, sql: &str, args: &[serde_json::Value]) -> Result<usize, DriverError>;

    /// Prepare and run a read-only query
    fn query(&self, sql: &str) -> Result<RowSet, DriverError>;

    /// Most positional arguments a single statement may bind
    fn max_bind_parameters(&self) -> usize;
}
