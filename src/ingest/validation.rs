//! Batch Validation
//!
//! Runs before any table is resolved or any row is written. A batch is
//! accepted or rejected as a whole.

use crate::error::{BalancerError, Result};
use crate::ingest::types::{Family, Record, Schema, TypeTag};

/// Column every family table reserves for its primary key
pub const RESERVED_COLUMN: &str = "id";

/// Validate a batch against its declared schema.
///
/// Rejects an empty family name, any schema entry whose tag is not a
/// recognized [`TypeTag`] or whose name collides with the `id` primary key,
/// and any record field that the schema does not declare.
pub fn validate_batch(family: &Family, schema: &Schema, records: &[Record]) -> Result<()> {
    if family.is_empty() {
        return Err(BalancerError::Validation(
            "family name must not be empty".to_string(),
        ));
    }

    for (field, tag) in schema.iter() {
        if field.eq_ignore_ascii_case(RESERVED_COLUMN) {
            return Err(BalancerError::Validation(format!(
                "field {} in the {} schema collides with the reserved primary key column",
                field, family
            )));
        }
        if TypeTag::parse(tag).is_none() {
            return Err(BalancerError::Validation(format!(
                "unsupported data type in {} schema for the field {}: {}",
                family, field, tag
            )));
        }
    }

    for (index, record) in records.iter().enumerate() {
        for field in record.keys() {
            if !schema.contains(field) {
                return Err(BalancerError::Validation(format!(
                    "data type for the field {} of record {} was not specified in the {} schema",
                    field, index, family
                )));
            }
        }
    }

    Ok(())
}

/// Typed tables bind one value per supported schema field per record, so
/// every record must carry a non-null value for each of those fields.
pub fn validate_populated(family: &Family, schema: &Schema, records: &[Record]) -> Result<()> {
    for (index, record) in records.iter().enumerate() {
        for (field, tag) in schema.iter() {
            if TypeTag::parse(tag).is_none() {
                continue;
            }
            if record.get(field).map_or(true, |value| value.is_null()) {
                return Err(BalancerError::Validation(format!(
                    "record {} of {} has no value for the field {}; every record must populate every schema field",
                    index, family, field
                )));
            }
        }
    }
    Ok(())
}
