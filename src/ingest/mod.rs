//! Event batch ingestion: wire types, validation and the storage façade

pub mod service;
pub mod types;
pub mod validation;

pub use service::{EventStore, IngestService};
pub use types::{Batch, Family, Record, Schema, TypeTag};
pub use validation::validate_batch;
