//! Read-only query classification
//!
//! Decides whether a raw SQL string is exactly one standalone SELECT before
//! anything reaches the connection.

use crate::error::{BalancerError, Result};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Exactly one standalone SELECT
    Select,
    /// Valid SQL that must not be executed
    Other,
}

/// Narrow capability the query gateway depends on, so the parser can be
/// swapped out in tests.
pub trait QueryClassifier: Send + Sync {
    /// Fails with [`BalancerError::Parse`] when `raw` is not valid SQL
    fn classify(&self, raw: &str) -> Result<Classification>;
}

/// Classifier backed by `sqlparser` with the SQLite grammar
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlParserClassifier;

impl QueryClassifier for SqlParserClassifier {
    fn classify(&self, raw: &str) -> Result<Classification> {
        let statements = Parser::parse_sql(&SQLiteDialect {}, raw).map_err(|e| BalancerError::Parse {
            query: raw.to_string(),
            message: e.to_string(),
        })?;

        match statements.as_slice() {
            [Statement::Query(query)] if is_read_only_query(query) => Ok(Classification::Select),
            _ => Ok(Classification::Other),
        }
    }
}

fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_read_only_query(&cte.query)));

    ctes_read_only && is_read_only_body(&query.body)
}

fn is_read_only_body(body: &SetExpr) -> bool {
    match body {
        // SELECT ... INTO creates a table
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => is_read_only_body(left) && is_read_only_body(right),
        SetExpr::Values(_) => true,
        _ => false,
    }
}
