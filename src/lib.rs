//! Schema-driven event storage over SQLite.
//!
//! Batches of JSON records arrive tagged with a family name and a per-field
//! type schema. Each family gets its own table, created on first sight, and
//! stored rows can be read back through a gateway that only runs single
//! SELECT statements.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod server;

pub use config::BalancerConfig;
pub use error::{BalancerError, Result};
pub use ingest::{EventStore, IngestService};
