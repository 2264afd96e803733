//! Stored entities: documents, subsets and methods
//!
//! Subsets and methods carry a `schema_version` tag. Entities written before
//! soft deletion existed deserialize as [`LEGACY_SCHEMA_VERSION`] and are
//! always live.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use miner_protocol::{DocumentId, MethodId, MethodStatus, MethodType, SubsetId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Schema version of entities written by this crate
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Schema version of entities that predate soft deletion
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

fn legacy_version() -> u32 {
    LEGACY_SCHEMA_VERSION
}

/// Typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    /// Numeric value
    Number(f64),
    /// Timestamp
    Datetime(DateTime<Utc>),
    /// Category path, root first
    Category(Vec<String>),
    /// Text or class label
    Text(String),
}

impl FieldValue {
    /// Plain JSON rendering for clients
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Datetime(dt) => Value::String(dt.to_rfc3339()),
            Self::Category(path) => Value::from(path.clone()),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    /// Text content, if this is a text value
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Numeric content, if this is a number
    #[inline]
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Flat string form used for exports
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Datetime(dt) => dt.to_rfc3339(),
            Self::Category(path) => path.join("/"),
            Self::Text(text) => text.clone(),
        }
    }
}

/// One ingested record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier
    pub id: DocumentId,
    /// Field values in schema order; `None` is null
    pub values: IndexMap<String, Option<FieldValue>>,
    /// Subsets containing this document
    #[serde(default)]
    pub in_subsets: BTreeSet<SubsetId>,
}

impl Document {
    /// Value of a field, `None` when missing or null
    #[inline]
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field).and_then(Option::as_ref)
    }

    /// Concatenated text of the given fields
    #[must_use]
    pub fn text_of(&self, fields: &[String]) -> String {
        fields
            .iter()
            .filter_map(|f| self.value(f))
            .map(FieldValue::display_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Named set of document references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subset {
    /// Subset identifier
    pub id: SubsetId,
    /// Display label
    pub label: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Method that produced this subset
    #[serde(default)]
    pub resulted_in: Option<MethodId>,
    /// Methods applied on this subset
    #[serde(default)]
    pub used_by: BTreeSet<MethodId>,
    /// Member documents in insertion order
    #[serde(default)]
    pub has_elements: Vec<DocumentId>,
    /// Soft-delete flag
    #[serde(default)]
    pub deleted: bool,
    /// Set when member documents were edited
    #[serde(default)]
    pub modified: bool,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Entity schema version
    #[serde(default = "legacy_version")]
    pub schema_version: u32,
}

impl Subset {
    /// Whether the subset counts as live
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.tracks_deletion() || !self.deleted
    }

    /// Whether soft deletion applies to this entity
    #[inline]
    #[must_use]
    pub fn tracks_deletion(&self) -> bool {
        self.schema_version >= CURRENT_SCHEMA_VERSION
    }
}

/// One analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    /// Method identifier
    pub id: MethodId,
    /// Method kind
    pub method_type: MethodType,
    /// Method parameters
    pub parameters: Value,
    /// Method result, once available
    #[serde(default)]
    pub result: Option<Value>,
    /// Lifecycle status
    pub status: MethodStatus,
    /// Subset the method consumed
    #[serde(default)]
    pub applied_on: Option<SubsetId>,
    /// Subsets the method produced
    #[serde(default)]
    pub produced: BTreeSet<SubsetId>,
    /// Soft-delete flag
    #[serde(default)]
    pub deleted: bool,
    /// Set when parameters changed after creation
    #[serde(default)]
    pub modified: bool,
    /// Entity schema version
    #[serde(default = "legacy_version")]
    pub schema_version: u32,
}

impl Method {
    /// Whether the method counts as live
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.tracks_deletion() || !self.deleted
    }

    /// Whether soft deletion applies to this entity
    #[inline]
    #[must_use]
    pub fn tracks_deletion(&self) -> bool {
        self.schema_version >= CURRENT_SCHEMA_VERSION
    }
}

/// Subset creation request
#[derive(Debug, Clone, Default)]
pub struct NewSubset {
    /// Display label
    pub label: String,
    /// Optional description
    pub description: Option<String>,
    /// Producing method
    pub resulted_in: Option<MethodId>,
    /// Member documents
    pub elements: Vec<DocumentId>,
    /// Free-form metadata
    pub metadata: Option<Value>,
}

impl NewSubset {
    /// Subset with a label and members
    #[must_use]
    pub fn new(label: impl Into<String>, elements: Vec<DocumentId>) -> Self {
        Self {
            label: label.into(),
            elements,
            ..Self::default()
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With producing method
    #[inline]
    #[must_use]
    pub fn with_resulted_in(mut self, method: MethodId) -> Self {
        self.resulted_in = Some(method);
        self
    }

    /// With metadata
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Method creation request
#[derive(Debug, Clone)]
pub struct NewMethod {
    /// Method kind
    pub method_type: MethodType,
    /// Method parameters
    pub parameters: Value,
    /// Consumed subset
    pub applied_on: Option<SubsetId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entities_without_version_are_legacy_and_live() {
        let subset: Subset = serde_json::from_value(json!({
            "id": 1,
            "label": "old",
            "deleted": true
        }))
        .unwrap();
        assert_eq!(subset.schema_version, LEGACY_SCHEMA_VERSION);
        assert!(subset.is_live());
    }

    #[test]
    fn current_entities_honor_deleted_flag() {
        let method: Method = serde_json::from_value(json!({
            "id": 2,
            "method_type": "aggregates.subset",
            "parameters": {},
            "status": "finished",
            "deleted": true,
            "schema_version": CURRENT_SCHEMA_VERSION
        }))
        .unwrap();
        assert!(!method.is_live());
    }

    #[test]
    fn field_value_rendering() {
        assert_eq!(FieldValue::Number(2.5).to_json(), json!(2.5));
        assert_eq!(FieldValue::Number(f64::NAN).to_json(), Value::Null);
        assert_eq!(
            FieldValue::Category(vec!["a".into(), "b".into()]).display_string(),
            "a/b"
        );
    }
}
