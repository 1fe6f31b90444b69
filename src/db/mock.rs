//! Recording connection for unit tests

use crate::db::sqlite::SQLITE_MAX_VARIABLE_NUMBER;
use crate::db::{DriverError, RowSet, SqlConnection};
use serde_json::Value;
use std::sync::Mutex;

/// Records every executed statement and returns canned query results
#[derive(Default)]
pub struct RecordingConnection {
    pub executed: Mutex<Vec<(String, Vec<Value>)>>,
    pub queried: Mutex<Vec<String>>,
    pub rows: Mutex<RowSet>,
    pub fail_with: Option<DriverError>,
    pub bind_limit: Option<usize>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: DriverError) -> Self {
        Self {
            fail_with: Some(err),
            ..Self::default()
        }
    }

    pub fn returning(rows: RowSet) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn with_bind_limit(limit: usize) -> Self {
        Self {
            bind_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn queried_sql(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

impl SqlConnection for RecordingConnection {
    fn execute(&self, sql: &str, args: &[Value]) -> Result<usize, DriverError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.executed.lock().unwrap().push((sql.to_string(), args.to_vec()));
        Ok(0)
    }

    fn query(&self, sql: &str) -> Result<RowSet, DriverError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.queried.lock().unwrap().push(sql.to_string());
        Ok(self.rows.lock().unwrap().clone())
    }

    fn max_bind_parameters(&self) -> usize {
        self.bind_limit.unwrap_or(SQLITE_MAX_VARIABLE_NUMBER)
    }
}
