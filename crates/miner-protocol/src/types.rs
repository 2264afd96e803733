//! Shared vocabulary types
//!
//! Identifiers and enumerations used on both sides of the RPC boundary:
//! - Session, subset, method and document identifiers
//! - Field descriptors and their aggregate mapping
//! - Method types and statuses
//! - Text processing configuration

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value
            #[inline]
            #[must_use]
            pub fn get(self) -> u64 {
                self.0
            }

            /// Value as a vector index
            #[inline]
            #[must_use]
            #[allow(clippy::cast_possible_truncation)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Dataset session identifier (one worker per dataset)
    SessionId
);
numeric_id!(
    /// Subset identifier within one dataset store
    SubsetId
);
numeric_id!(
    /// Method identifier within one dataset store
    MethodId
);
numeric_id!(
    /// Document (record) identifier within one dataset store
    DocumentId
);

impl SubsetId {
    /// The root subset containing every ingested document
    pub const ROOT: SubsetId = SubsetId(0);
}

/// Column type of a dataset field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Floating point value
    Number,
    /// Date and time value
    Datetime,
    /// Hierarchical category path (`a/b/c`)
    Category,
    /// Free text
    Text,
    /// Single class label
    Class,
}

impl FieldType {
    /// Aggregate computed for fields of this type
    #[inline]
    #[must_use]
    pub fn aggregate(self) -> AggregateType {
        match self {
            Self::Number => AggregateType::Histogram,
            Self::Text => AggregateType::Keywords,
            Self::Class => AggregateType::Count,
            Self::Category => AggregateType::Hierarchy,
            Self::Datetime => AggregateType::Timeline,
        }
    }
}

/// Aggregate statistics kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    /// Numeric histogram with summary statistics
    Histogram,
    /// Top keywords of a text field
    Keywords,
    /// Category tree with sizes
    Hierarchy,
    /// Value frequency table
    Count,
    /// Date bucket counts
    Timeline,
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Histogram => "histogram",
            Self::Keywords => "keywords",
            Self::Hierarchy => "hierarchy",
            Self::Count => "count",
            Self::Timeline => "timeline",
        };
        f.write_str(name)
    }
}

/// Field descriptor supplied when a dataset is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column name
    pub name: String,
    /// Column type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the column is stored
    #[serde(default = "default_included")]
    pub included: bool,
}

fn default_included() -> bool {
    true
}

impl FieldDescriptor {
    /// Create an included field descriptor
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            included: true,
        }
    }

    /// Exclude this field from storage
    #[inline]
    #[must_use]
    pub fn excluded(mut self) -> Self {
        self.included = false;
        self
    }
}

/// Analysis method kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodType {
    /// Per-field aggregate statistics over a subset
    #[serde(rename = "aggregates.subset")]
    Aggregate,
    /// K-means clustering
    #[serde(rename = "clustering.kmeans")]
    Clustering,
    /// Interactive active learning classifier
    #[serde(rename = "classifier.active_learning")]
    ActiveLearning,
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Aggregate => "aggregates.subset",
            Self::Clustering => "clustering.kmeans",
            Self::ActiveLearning => "classifier.active_learning",
        };
        f.write_str(name)
    }
}

/// Method lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodStatus {
    /// Created, not yet running
    InQueue,
    /// Running (active learning stays here across round trips)
    Training,
    /// Completed with a result
    Finished,
    /// Failed or interrupted
    Error,
}

impl MethodStatus {
    /// Whether no further transitions are possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

/// Stopword configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stopwords {
    /// Built-in stopword list name
    #[serde(default = "default_language")]
    pub language: String,
    /// Additional words
    #[serde(default)]
    pub words: Vec<String>,
}

fn default_language() -> String {
    "none".to_string()
}

impl Default for Stopwords {
    fn default() -> Self {
        Self {
            language: default_language(),
            words: Vec::new(),
        }
    }
}

impl Stopwords {
    /// Merge method-specific stopwords on top of these defaults
    #[must_use]
    pub fn merged_with(&self, overrides: Option<&Stopwords>) -> Stopwords {
        let mut merged = self.clone();
        if let Some(extra) = overrides {
            for word in &extra.words {
                let word = word.trim();
                if !word.is_empty() && !merged.words.iter().any(|w| w == word) {
                    merged.words.push(word.to_string());
                }
            }
        }
        merged
    }
}

/// Text processing configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processing {
    /// Stopwords removed before feature extraction
    #[serde(default)]
    pub stopwords: Stopwords,
}

/// Error classification carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or invalid request content
    Validation,
    /// Referenced entity does not exist
    NotFound,
    /// Method failed on the supplied input
    Training,
    /// Unexpected worker-side failure
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_mapping_covers_every_field_type() {
        assert_eq!(FieldType::Number.aggregate(), AggregateType::Histogram);
        assert_eq!(FieldType::Text.aggregate(), AggregateType::Keywords);
        assert_eq!(FieldType::Class.aggregate(), AggregateType::Count);
        assert_eq!(FieldType::Category.aggregate(), AggregateType::Hierarchy);
        assert_eq!(FieldType::Datetime.aggregate(), AggregateType::Timeline);
    }

    #[test]
    fn method_type_wire_names() {
        let json = serde_json::to_string(&MethodType::ActiveLearning).unwrap();
        assert_eq!(json, "\"classifier.active_learning\"");
        let parsed: MethodType = serde_json::from_str("\"clustering.kmeans\"").unwrap();
        assert_eq!(parsed, MethodType::Clustering);
    }

    #[test]
    fn stopwords_merge_keeps_defaults_and_skips_duplicates() {
        let base = Stopwords {
            language: "none".into(),
            words: vec!["the".into()],
        };
        let extra = Stopwords {
            language: "none".into(),
            words: vec!["the".into(), "foo".into(), " ".into()],
        };
        let merged = base.merged_with(Some(&extra));
        assert_eq!(merged.words, vec!["the".to_string(), "foo".to_string()]);
        assert_eq!(base.merged_with(None), base);
    }

    #[test]
    fn field_descriptor_defaults_to_included() {
        let field: FieldDescriptor =
            serde_json::from_str(r#"{"name":"title","type":"text"}"#).unwrap();
        assert!(field.included);
        assert_eq!(field.field_type, FieldType::Text);
    }
}
