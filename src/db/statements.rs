//! Statement Builder
//!
//! Pure functions that turn a family name and schema into DDL/DML text.
//! Identifiers cannot be bound as parameters, so every caller-supplied
//! identifier goes through [`escape`] and is wrapped in backticks; record
//! values are never interpolated and travel as positional arguments instead.

use crate::ingest::types::{Record, Schema, TypeTag};
use serde_json::Value;

/// Declared column type for a schema tag
pub fn column_type(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::String => "TEXT",
        TypeTag::Int => "INTEGER",
    }
}

/// A schema field that becomes a table column
#[derive(Debug, Clone, PartialEq)]
pub struct Column<'a> {
    /// Field name as sent by the caller
    pub field: &'a str,
    /// Field name after [`escape`]
    pub escaped: String,
    pub tag: TypeTag,
}

/// Supported schema fields ordered by escaped name.
///
/// Entries with an unrecognized tag produce no column.
pub fn sorted_columns(schema: &Schema) -> Vec<Column<'_>> {
    let mut columns: Vec<Column<'_>> = schema
        .iter()
        .filter_map(|(field, tag)| {
            TypeTag::parse(tag).map(|tag| Column {
                field,
                escaped: escape(field),
                tag,
            })
        })
        .collect();
    columns.sort_by(|a, b| a.escaped.cmp(&b.escaped));
    columns
}

/// `CREATE TABLE IF NOT EXISTS` for a family: an auto-increment `id` primary
/// key first, then one nullable column per supported schema field.
pub fn build_create_table(name: &str, schema: &Schema) -> String {
    let mut clauses = vec!["`id` INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT".to_string()];
    clauses.extend(
        sorted_columns(schema)
            .iter()
            .map(|column| format!("{} {}", wrap_identifier(&column.escaped), column_type(column.tag))),
    );

    format!(
        "CREATE TABLE IF NOT EXISTS {}({});",
        quote_identifier(name),
        clauses.join(", ")
    )
}

/// Multi-row `INSERT` for a batch plus its positional arguments.
///
/// Every record gets one placeholder per column, but only present, non-null
/// values are pushed as arguments. A batch where some record leaves a column
/// unpopulated therefore yields fewer arguments than placeholders; nothing is
/// padded with NULL here.
pub fn build_insert(name: &str, schema: &Schema, records: &[Record]) -> (String, Vec<Value>) {
    let columns = sorted_columns(schema);
    let table = quote_identifier(name);

    if columns.is_empty() {
        let groups = vec!["(NULL)"; records.len()].join(", ");
        return (format!("INSERT INTO {}(`id`) VALUES {};", table, groups), Vec::new());
    }

    let column_list = columns
        .iter()
        .map(|column| wrap_identifier(&column.escaped))
        .collect::<Vec<_>>()
        .join(", ");
    let group = format!("({})", vec!["?"; columns.len()].join(", "));
    let groups = vec![group.as_str(); records.len()].join(", ");

    let mut args = Vec::with_capacity(records.len() * columns.len());
    for record in records {
        for column in &columns {
            match record.get(column.field) {
                Some(Value::Null) | None => {}
                Some(value) => args.push(value.clone()),
            }
        }
    }

    (
        format!("INSERT INTO {}({}) VALUES {};", table, column_list, groups),
        args,
    )
}

/// Shared table used by the raw storage mode
pub const RAW_LOGS_TABLE: &str = "raw_logs";

/// DDL for the shared raw-log table
pub fn build_create_raw_logs() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {}(`id` INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, `family` TEXT, `log` TEXT);",
        quote_identifier(RAW_LOGS_TABLE)
    )
}

/// Multi-row insert of whole records, serialized as JSON, tagged with their
/// family name
pub fn build_raw_insert(family: &str, records: &[Record]) -> serde_json::Result<(String, Vec<Value>)> {
    let groups = vec!["(?, ?)"; records.len()].join(", ");
    let mut args = Vec::with_capacity(records.len() * 2);
    for record in records {
        args.push(Value::String(family.to_string()));
        args.push(Value::String(serde_json::to_string(record)?));
    }
    Ok((
        format!(
            "INSERT INTO {}(`family`, `log`) VALUES {};",
            quote_identifier(RAW_LOGS_TABLE),
            groups
        ),
        args,
    ))
}

/// Number of `?` slots [`build_insert`] emits for this batch
pub fn placeholder_count(schema: &Schema, records: &[Record]) -> usize {
    sorted_columns(schema).len() * records.len()
}

/// Escape and backtick-quote a caller-supplied identifier
pub fn quote_identifier(raw: &str) -> String {
    wrap_identifier(&escape(raw))
}

/// Backtick-quote an already escaped identifier. Embedded backticks are
/// doubled so the identifier cannot close its own quotes.
fn wrap_identifier(escaped: &str) -> String {
    format!("`{}`", escaped.replace('`', "``"))
}

/// Backslash-escape the characters that can terminate or corrupt a quoted
/// SQL token: NUL, newline, carriage return, backslash, both quote
/// characters and Ctrl-Z.
///
/// SQLite keeps these backslashes literally inside backtick identifiers, so
/// an escaped name is the stored name: a field `it's` becomes the column
/// `it\'s`, and rows read back through a query are keyed by that column
/// name rather than the raw field name.
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for c in raw.chars() {
        let escaped = match c {
            '\0' => Some('0'),
            '\n' => Some('n'),
            '\r' => Some('r'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            '\x1a' => Some('Z'),
            _ => None,
        };
        match escaped {
            Some(e) => {
                out.push('\\');
                out.push(e);
            }
            None => out.push(c),
        }
    }
    out
}
