//! Event Batch Types
//!
//! A batch names its family, declares a schema (field name -> type tag) and
//! carries records whose fields must all be declared in that schema.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Logical event stream name; maps 1:1 to a relational table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Family(String);

impl Family {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Family {
    fn from(name: &str) -> Self {
        Family(name.to_string())
    }
}

impl From<String> for Family {
    fn from(name: String) -> Self {
        Family(name)
    }
}

/// Recognized field types. This is the single registry consulted by both
/// batch validation and DDL generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Int,
}

impl TypeTag {
    pub fn parse(tag: &str) -> Option<TypeTag> {
        match tag {
            "string" => Some(TypeTag::String),
            "int" => Some(TypeTag::Int),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Int => "int",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field name -> declared type tag, as sent by the caller.
///
/// Tags are kept as raw strings so that an unsupported tag survives
/// deserialization and can be reported by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(BTreeMap<String, String>);

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, tag: impl Into<String>) {
        self.0.insert(field.into(), tag.into());
    }

    /// Raw tag declared for `field`
    pub fn raw_tag(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Parsed tag for `field`; `None` when undeclared or unsupported
    pub fn tag(&self, field: &str) -> Option<TypeTag> {
        self.raw_tag(field).and_then(TypeTag::parse)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, t)| (f.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Schema {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Schema(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One event: field name -> dynamically typed value
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Wire shape of an ingest request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub family: Family,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub logs: Vec<Record>,
}
