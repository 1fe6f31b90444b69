//! Table Registry
//!
//! Resolves a family to a live table, issuing `CREATE TABLE IF NOT EXISTS`
//! on first use. The family -> table cache is advisory: a miss only costs
//! another idempotent DDL round-trip, and two requests racing on the same
//! uncached family both issuing the create is harmless.

use crate::db::statements::{
    build_create_raw_logs, build_create_table, build_insert, build_raw_insert, placeholder_count,
    sorted_columns, RAW_LOGS_TABLE,
};
use crate::db::SqlConnection;
use crate::error::{BalancerError, Result};
use crate::ingest::types::{Family, Record, Schema};
use crate::ingest::validation::validate_populated;
use dashmap::DashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How ingested records are laid out in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// One typed table per family, one column per schema field
    #[default]
    Typed,
    /// Every family shares `raw_logs(family, log)`, records stored as JSON
    Raw,
}

impl FromStr for StorageMode {
    type Err = BalancerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "typed" => Ok(StorageMode::Typed),
            "raw" => Ok(StorageMode::Raw),
            other => Err(BalancerError::Config(format!(
                "unknown storage mode '{}' (expected 'typed' or 'raw')",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Typed => f.write_str("typed"),
            StorageMode::Raw => f.write_str("raw"),
        }
    }
}

impl StorageMode {
    /// Positional arguments one insert of `records` binds
    fn bind_parameters(self, schema: &Schema, records: &[Record]) -> usize {
        match self {
            StorageMode::Typed => placeholder_count(schema, records),
            StorageMode::Raw => records.len() * 2,
        }
    }
}

/// Checks that need no I/O: typed rows must populate every column and the
/// batch must fit in a single statement.
fn check_batch(
    mode: StorageMode,
    bind_limit: usize,
    family: &Family,
    schema: &Schema,
    records: &[Record],
) -> Result<()> {
    if mode == StorageMode::Typed {
        validate_populated(family, schema, records)?;
    }

    let needed = mode.bind_parameters(schema, records);
    if needed > bind_limit {
        return Err(BalancerError::Validation(format!(
            "batch of {} records for {} needs {} bound values but the database accepts at most {} per statement; split it into smaller batches",
            records.len(),
            family,
            needed,
            bind_limit
        )));
    }
    Ok(())
}

/// Handle to the table backing one family, bound to the schema of the batch
/// it was resolved for
pub struct Table {
    family: Family,
    schema: Schema,
    mode: StorageMode,
    conn: Arc<dyn SqlConnection>,
}

impl Table {
    /// Insert a batch as one multi-row statement. An empty batch succeeds
    /// without touching the connection.
    pub fn insert(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            debug!(family = %self.family, "empty batch, nothing to insert");
            return Ok(());
        }
        check_batch(
            self.mode,
            self.conn.max_bind_parameters(),
            &self.family,
            &self.schema,
            records,
        )?;

        let (sql, args) = match self.mode {
            StorageMode::Typed => self.typed_insert(records)?,
            StorageMode::Raw => build_raw_insert(self.family.as_str(), records)?,
        };

        let target = match self.mode {
            StorageMode::Typed => self.family.as_str(),
            StorageMode::Raw => RAW_LOGS_TABLE,
        };
        self.conn.execute(&sql, &args).map_err(|e| {
            warn!(family = %self.family, error = %e, "insert failed");
            BalancerError::storage("insert", target, e)
        })?;

        info!(family = %self.family, records = records.len(), "inserted batch");
        Ok(())
    }

    fn typed_insert(&self, records: &[Record]) -> Result<(String, Vec<serde_json::Value>)> {
        let columns = sorted_columns(&self.schema);
        for record in records {
            if let Some(field) = record.keys().find(|f| !columns.iter().any(|c| c.field == f.as_str())) {
                return Err(BalancerError::Validation(format!(
                    "field {} is not a column of table {}",
                    field, self.family
                )));
            }
        }

        Ok(build_insert(self.family.as_str(), &self.schema, records))
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("family", &self.family)
            .field("schema", &self.schema)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Family -> table resolution with an optional advisory cache.
///
/// The cache only remembers which families already have a table. Handles
/// are always built from the caller's schema, so turning the cache off
/// changes how much DDL runs and nothing else.
pub struct TableRegistry {
    conn: Arc<dyn SqlConnection>,
    mode: StorageMode,
    cache: Option<DashSet<Family>>,
}

impl TableRegistry {
    pub fn new(conn: Arc<dyn SqlConnection>, mode: StorageMode, cache_tables: bool) -> Self {
        Self {
            conn,
            mode,
            cache: cache_tables.then(DashSet::new),
        }
    }

    /// Number of families known to have a table
    pub fn cached(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.len())
    }

    /// Reject a batch that could never be inserted, before any DDL runs
    pub fn check_batch(&self, family: &Family, schema: &Schema, records: &[Record]) -> Result<()> {
        check_batch(self.mode, self.conn.max_bind_parameters(), family, schema, records)
    }

    /// Return the table for `family`, creating it if this registry has not
    /// seen the family yet.
    pub fn find_or_create_table(&self, family: &Family, schema: &Schema) -> Result<Table> {
        let known = self.cache.as_ref().map_or(false, |cache| cache.contains(family));
        if known {
            debug!(family = %family, "table cache hit");
        } else {
            let (sql, target) = match self.mode {
                StorageMode::Typed => (build_create_table(family.as_str(), schema), family.as_str()),
                StorageMode::Raw => (build_create_raw_logs(), RAW_LOGS_TABLE),
            };
            self.conn.execute(&sql, &[]).map_err(|e| {
                warn!(family = %family, error = %e, "create table failed");
                BalancerError::storage("create", target, e)
            })?;
            info!(family = %family, columns = schema.len(), mode = %self.mode, "table ready");

            if let Some(cache) = &self.cache {
                cache.insert(family.clone());
            }
        }

        Ok(Table {
            family: family.clone(),
            schema: schema.clone(),
            mode: self.mode,
            conn: Arc::clone(&self.conn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::RecordingConnection;
    use crate::db::DriverError;
    use serde_json::json;

    fn dog_schema() -> Schema {
        [("name", "string"), ("breed", "string"), ("weight", "int")]
            .into_iter()
            .collect()
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_cache_hit_skips_ddl() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, true);
        let family = Family::from("dog_registry");

        registry.find_or_create_table(&family, &dog_schema()).unwrap();
        registry.find_or_create_table(&family, &dog_schema()).unwrap();

        assert_eq!(conn.executed_sql().len(), 1);
        assert_eq!(registry.cached(), 1);
    }

    #[test]
    fn test_without_cache_ddl_is_reissued() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, false);
        let family = Family::from("dog_registry");

        registry.find_or_create_table(&family, &dog_schema()).unwrap();
        registry.find_or_create_table(&family, &dog_schema()).unwrap();

        let executed = conn.executed_sql();
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0], executed[1]);
        assert_eq!(registry.cached(), 0);
    }

    #[test]
    fn test_cache_does_not_change_insert_outcome() {
        let narrower: Schema = [("name", "string")].into_iter().collect();
        let family = Family::from("dog_registry");

        let outcomes: Vec<(bool, Option<String>)> = [true, false]
            .into_iter()
            .map(|cache_tables| {
                let conn = Arc::new(RecordingConnection::new());
                let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, cache_tables);
                registry.find_or_create_table(&family, &dog_schema()).unwrap();

                let table = registry.find_or_create_table(&family, &narrower).unwrap();
                let ok = table.insert(&[record(json!({"name": "spot"}))]).is_ok();
                (ok, conn.executed_sql().pop())
            })
            .collect();

        let expected = Some("INSERT INTO `dog_registry`(`name`) VALUES (?);".to_string());
        assert_eq!(outcomes, vec![(true, expected.clone()), (true, expected)]);
    }

    #[test]
    fn test_concurrent_misses_for_one_family_all_succeed() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, true);
        let family = Family::from("dog_registry");

        let results: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let (registry, family) = (&registry, &family);
                    scope.spawn(move || -> Result<()> {
                        let table = registry.find_or_create_table(family, &dog_schema())?;
                        table.insert(&[record(json!({"name": format!("dog{}", i), "breed": "pug", "weight": i}))])
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(registry.cached(), 1);
        let executed = conn.executed_sql();
        let creates = executed.iter().filter(|sql| sql.starts_with("CREATE")).count();
        let inserts = executed.iter().filter(|sql| sql.starts_with("INSERT")).count();
        assert!((1..=8).contains(&creates));
        assert_eq!(inserts, 8);
    }

    #[test]
    fn test_insert_empty_batch_does_not_execute() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, true);
        let table = registry
            .find_or_create_table(&Family::from("dog_registry"), &dog_schema())
            .unwrap();

        table.insert(&[]).unwrap();
        // only the CREATE
        assert_eq!(conn.executed_sql().len(), 1);
    }

    #[test]
    fn test_insert_executes_one_statement() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, true);
        let table = registry
            .find_or_create_table(&Family::from("dog_registry"), &dog_schema())
            .unwrap();

        table
            .insert(&[
                record(json!({"name": "max", "breed": "chihuahua", "weight": 3})),
                record(json!({"name": "spot", "breed": "husky", "weight": 130})),
            ])
            .unwrap();

        let executed = conn.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert_eq!(
            executed[1].0,
            "INSERT INTO `dog_registry`(`breed`, `name`, `weight`) VALUES (?, ?, ?), (?, ?, ?);"
        );
        assert_eq!(executed[1].1.len(), 6);
    }

    #[test]
    fn test_insert_with_unpopulated_field_fails_before_execute() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, true);
        let table = registry
            .find_or_create_table(&Family::from("dog_registry"), &dog_schema())
            .unwrap();

        let err = table
            .insert(&[record(json!({"name": "max", "breed": "chihuahua"}))])
            .unwrap_err();
        assert!(matches!(err, BalancerError::Validation(_)));
        assert!(err.to_string().contains("weight"));
        assert_eq!(conn.executed_sql().len(), 1);
    }

    #[test]
    fn test_batch_over_bind_limit_is_rejected_without_sql() {
        let conn = Arc::new(RecordingConnection::with_bind_limit(5));
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, true);
        let family = Family::from("dog_registry");
        let batch = [
            record(json!({"name": "max", "breed": "chihuahua", "weight": 3})),
            record(json!({"name": "spot", "breed": "husky", "weight": 130})),
        ];

        let err = registry.check_batch(&family, &dog_schema(), &batch).unwrap_err();
        assert!(matches!(err, BalancerError::Validation(_)));
        assert!(err.to_string().contains("at most 5"));
        assert!(!err.to_string().contains("INSERT"));

        let table = registry.find_or_create_table(&family, &dog_schema()).unwrap();
        assert!(table.insert(&batch).is_err());
        assert!(table.insert(&batch[..1]).is_ok());
        assert_eq!(conn.executed_sql().len(), 2);
    }

    #[test]
    fn test_raw_mode_allows_partial_records() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn, StorageMode::Raw, true);
        let batch = [record(json!({"name": "max"}))];
        assert!(registry
            .check_batch(&Family::from("dog_registry"), &dog_schema(), &batch)
            .is_ok());
    }

    #[test]
    fn test_insert_rejects_field_outside_table_schema() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Typed, true);
        let table = registry
            .find_or_create_table(&Family::from("dog_registry"), &dog_schema())
            .unwrap();

        let err = table
            .insert(&[record(json!({"name": "max", "breed": "pug", "weight": 8, "age": 2}))])
            .unwrap_err();
        assert!(matches!(err, BalancerError::Validation(_)));
    }

    #[test]
    fn test_create_failure_is_storage_error_with_context() {
        let conn = Arc::new(RecordingConnection::failing(DriverError::Sql("disk full".to_string())));
        let registry = TableRegistry::new(conn, StorageMode::Typed, true);

        let err = registry
            .find_or_create_table(&Family::from("dog_registry"), &dog_schema())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Storage error during create on 'dog_registry': disk full"
        );
        assert_eq!(registry.cached(), 0);
    }

    #[test]
    fn test_raw_mode_uses_shared_table() {
        let conn = Arc::new(RecordingConnection::new());
        let registry = TableRegistry::new(conn.clone(), StorageMode::Raw, true);
        let table = registry
            .find_or_create_table(&Family::from("dog_registry"), &dog_schema())
            .unwrap();
        table.insert(&[record(json!({"name": "max"}))]).unwrap();

        let executed = conn.executed_sql();
        assert!(executed[0].contains("`raw_logs`"));
        assert_eq!(executed[1], "INSERT INTO `raw_logs`(`family`, `log`) VALUES (?, ?);");
    }

    #[test]
    fn test_storage_mode_from_str() {
        assert_eq!("typed".parse::<StorageMode>().unwrap(), StorageMode::Typed);
        assert_eq!("RAW".parse::<StorageMode>().unwrap(), StorageMode::Raw);
        assert!("sharded".parse::<StorageMode>().is_err());
    }
}
