//! Ingestion Service
//!
//! The storage layer's façade: validates batches, resolves tables and
//! forwards reads to the query gateway.

use crate::db::{QueryGateway, QueryResult, SqlConnection, StorageMode, TableDescription, TableRegistry};
use crate::error::Result;
use crate::ingest::types::{Family, Record, Schema};
use crate::ingest::validation::validate_batch;
use std::sync::Arc;
use tracing::{debug, info};

/// Operations the transport layer calls
pub trait EventStore: Send + Sync {
    fn ingest(&self, family: &Family, schema: &Schema, records: &[Record]) -> Result<()>;
    fn query(&self, raw: &str) -> Result<QueryResult>;
    fn describe(&self) -> Result<Vec<TableDescription>>;
}

pub struct IngestService {
    registry: TableRegistry,
    gateway: QueryGateway,
}

impl IngestService {
    pub fn new(registry: TableRegistry, gateway: QueryGateway) -> Self {
        Self { registry, gateway }
    }

    /// Wire a registry and gateway over one shared connection
    pub fn from_connection(conn: Arc<dyn SqlConnection>, mode: StorageMode, cache_tables: bool) -> Self {
        Self::new(
            TableRegistry::new(Arc::clone(&conn), mode, cache_tables),
            QueryGateway::new(conn),
        )
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }
}

impl EventStore for IngestService {
    /// Validate the whole batch, then create the family's table if needed and
    /// insert every record in one statement. Nothing touches the database
    /// when validation fails.
    fn ingest(&self, family: &Family, schema: &Schema, records: &[Record]) -> Result<()> {
        validate_batch(family, schema, records)?;
        self.registry.check_batch(family, schema, records)?;

        info!(family = %family, records = records.len(), "received batch");
        for (field, tag) in schema.iter() {
            debug!(family = %family, field, tag, "schema field");
        }

        let table = self.registry.find_or_create_table(family, schema)?;
        table.insert(records)
    }

    fn query(&self, raw: &str) -> Result<QueryResult> {
        self.gateway.query(raw)
    }

    fn describe(&self) -> Result<Vec<TableDescription>> {
        self.gateway.describe()
    }
}
