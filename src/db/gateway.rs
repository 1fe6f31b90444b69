//! Query Gateway
//!
//! Read-only SQL over the ingested tables, plus catalog introspection.

use crate::db::classify::{Classification, QueryClassifier, SqlParserClassifier};
use crate::db::{DriverError, DriverValue, RowSet, SqlConnection};
use crate::error::{BalancerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rows of a query, each a column -> value mapping
pub type QueryResult = Vec<Map<String, Value>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub nullable: bool,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDescription>,
}

/// One (schema, table, column) entry from the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub nullable: bool,
    pub data_type: String,
}

/// Every column of every user table. `group_catalog` depends on the
/// ORDER BY keeping each table's columns contiguous.
const DESCRIBE_SQL: &str = "SELECT 'main' AS table_schema, m.name AS table_name, p.name AS column_name, \
     p.\"notnull\" AS not_null, p.type AS column_type \
     FROM sqlite_master AS m JOIN pragma_table_info(m.name) AS p \
     WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
     ORDER BY m.name, p.cid";

pub struct QueryGateway {
    conn: Arc<dyn SqlConnection>,
    classifier: Box<dyn QueryClassifier>,
}

impl QueryGateway {
    pub fn new(conn: Arc<dyn SqlConnection>) -> Self {
        Self::with_classifier(conn, Box::new(SqlParserClassifier))
    }

    pub fn with_classifier(conn: Arc<dyn SqlConnection>, classifier: Box<dyn QueryClassifier>) -> Self {
        Self { conn, classifier }
    }

    /// Run `raw` if and only if it is a single standalone SELECT
    pub fn query(&self, raw: &str) -> Result<QueryResult> {
        if self.classifier.classify(raw)? != Classification::Select {
            warn!(query = raw, "rejected non-SELECT query");
            return Err(BalancerError::ReadOnly);
        }

        let rows = self.conn.query(raw).map_err(|e| match e {
            DriverError::NotReadOnly => {
                warn!(query = raw, "connection refused a writing statement");
                BalancerError::ReadOnly
            }
            other => BalancerError::storage("select", raw, other),
        })?;

        debug!(rows = rows.rows.len(), "query returned");
        Ok(materialize(rows))
    }

    /// Columns of every user table, grouped per table in name order
    pub fn describe(&self) -> Result<Vec<TableDescription>> {
        let rows = self
            .conn
            .query(DESCRIBE_SQL)
            .map_err(|e| BalancerError::storage("describe", "sqlite_master", e))?;

        let catalog = rows
            .rows
            .into_iter()
            .map(catalog_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(group_catalog(catalog))
    }
}

/// Convert driver rows into generic mappings. Byte values become text so
/// serializers never see binary.
pub fn materialize(rows: RowSet) -> QueryResult {
    let RowSet { columns, rows } = rows;
    rows.into_iter()
        .map(|row| {
            columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(to_json))
                .collect::<Map<String, Value>>()
        })
        .collect()
}

fn to_json(value: DriverValue) -> Value {
    match value {
        DriverValue::Null => Value::Null,
        DriverValue::Integer(i) => Value::Number(i.into()),
        DriverValue::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        DriverValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn catalog_row(row: Vec<DriverValue>) -> Result<CatalogRow> {
    let malformed = || BalancerError::storage("describe", "sqlite_master", "unexpected catalog row shape");
    let text = |value: &DriverValue| match value {
        DriverValue::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        DriverValue::Null => Some(String::new()),
        _ => None,
    };

    match row.as_slice() {
        [schema, table, column, DriverValue::Integer(not_null), data_type] => Ok(CatalogRow {
            schema: text(schema).ok_or_else(malformed)?,
            table: text(table).ok_or_else(malformed)?,
            column: text(column).ok_or_else(malformed)?,
            nullable: *not_null == 0,
            data_type: text(data_type).ok_or_else(malformed)?,
        }),
        _ => Err(malformed()),
    }
}

/// Fold consecutive catalog rows sharing a schema and table name into one
/// description. Same-named tables in different schemas stay separate.
pub fn group_catalog(rows: Vec<CatalogRow>) -> Vec<TableDescription> {
    let mut tables: Vec<TableDescription> = Vec::new();
    let mut current_schema: Option<String> = None;
    for row in rows {
        let column = ColumnDescription {
            name: row.column,
            nullable: row.nullable,
            data_type: row.data_type,
        };
        let same_schema = current_schema.as_deref() == Some(row.schema.as_str());
        match tables.last_mut() {
            Some(current) if same_schema && current.name == row.table => current.columns.push(column),
            _ => {
                current_schema = Some(row.schema);
                tables.push(TableDescription {
                    name: row.table,
                    columns: vec![column],
                });
            }
        }
    }
    tables
}
