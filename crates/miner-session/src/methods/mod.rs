//! Method runners
//!
//! - [`active_learning`]: interactive binary labelling loop
//! - [`clustering`]: k-means over text or numeric fields
//!
//! Aggregates run inline in the session; see [`crate::aggregate`].

pub mod active_learning;
pub mod clustering;

use crate::error::SessionError;
use miner_engine::{RankOrder, SummaryStats, TextFeatureSpace, Tokenizer};
use miner_protocol::{FieldDescriptor, FieldType, Processing, Stopwords, SubsetId};
use ndarray::Array1;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Features used for a label before falling back to a default
const LABEL_FEATURES: usize = 4;

/// Parameters shared by every method type
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodParameters {
    /// Subset the method runs on
    pub subset_id: SubsetId,
    /// Fields the method reads; empty means every included field
    #[serde(default)]
    pub fields: Vec<String>,
    /// Method-specific processing, merged over the dataset defaults
    #[serde(default)]
    pub processing: Option<Processing>,
    /// Type-specific options
    #[serde(default)]
    pub method: Value,
}

impl MethodParameters {
    /// Parse the parameter object of a `CREATE_METHOD` request
    ///
    /// # Errors
    /// - `SessionError::Validation` if required keys are missing or mistyped
    pub fn parse(parameters: &Value) -> Result<Self, SessionError> {
        Self::deserialize(parameters)
            .map_err(|e| SessionError::validation(format!("invalid method parameters: {e}")))
    }

    /// Dataset stopwords with the method-specific words appended
    #[must_use]
    pub fn stopwords(&self, defaults: &Stopwords) -> Stopwords {
        defaults.merged_with(self.processing.as_ref().map(|p| &p.stopwords))
    }

    /// Resolve the field list against the schema
    ///
    /// An empty list selects every schema field accepted by `allowed`.
    ///
    /// # Errors
    /// - `SessionError::Validation` for unknown fields or fields of a type
    ///   `allowed` rejects
    pub fn resolve_fields(
        &self,
        schema: &[FieldDescriptor],
        allowed: impl Fn(FieldType) -> bool,
    ) -> Result<Vec<String>, SessionError> {
        if self.fields.is_empty() {
            let all: Vec<String> = schema
                .iter()
                .filter(|f| allowed(f.field_type))
                .map(|f| f.name.clone())
                .collect();
            if all.is_empty() {
                return Err(SessionError::validation("dataset has no field usable by this method"));
            }
            return Ok(all);
        }
        for name in &self.fields {
            let field = schema
                .iter()
                .find(|f| &f.name == name)
                .ok_or_else(|| SessionError::validation(format!("unknown field '{name}'")))?;
            if !allowed(field.field_type) {
                return Err(SessionError::validation(format!(
                    "field '{name}' of type {:?} cannot be used by this method",
                    field.field_type
                )));
            }
        }
        Ok(self.fields.clone())
    }
}

/// Write the effective stopwords back into stored parameters
pub(crate) fn store_processing(parameters: &mut Value, stopwords: &Stopwords) {
    if let Value::Object(map) = parameters {
        map.insert(
            "processing".to_string(),
            json!({ "stopwords": stopwords }),
        );
    }
}

/// Tokenizer for a stopword configuration
#[must_use]
pub fn tokenizer_for(stopwords: &Stopwords) -> Tokenizer {
    Tokenizer::new(&stopwords.language, &stopwords.words)
}

/// Whether a field type carries free text
#[inline]
#[must_use]
pub fn is_textual(field_type: FieldType) -> bool {
    matches!(field_type, FieldType::Text | FieldType::Class)
}

/// Named feature weights ranked by value
///
/// Stops at `limit` entries or at the first weight on the wrong side of
/// zero for `order`.
#[must_use]
pub fn top_features(
    space: &TextFeatureSpace,
    weights: &Array1<f64>,
    order: RankOrder,
    limit: usize,
) -> Vec<(String, f64)> {
    let mut ranked: Vec<(usize, f64)> = weights.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match order {
            RankOrder::Descending => ord.reverse(),
            RankOrder::Ascending => ord,
        }
    });
    ranked
        .into_iter()
        .take(limit)
        .take_while(|(_, w)| match order {
            RankOrder::Descending => *w > 0.0,
            RankOrder::Ascending => *w < 0.0,
        })
        .filter_map(|(idx, w)| space.feature(idx).map(|name| (name.to_string(), w)))
        .collect()
}

/// Subset label built from the leading features
#[must_use]
pub fn feature_label(features: &[(String, f64)], fallback: &str) -> String {
    if features.is_empty() {
        return fallback.to_string();
    }
    features
        .iter()
        .take(LABEL_FEATURES)
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn features_json(features: &[(String, f64)]) -> Value {
    Value::from(
        features
            .iter()
            .map(|(feature, weight)| json!({"feature": feature, "weight": weight}))
            .collect::<Vec<_>>(),
    )
}

pub(crate) fn stats_json(stats: &SummaryStats) -> Value {
    json!({
        "mean": stats.mean,
        "std": stats.std,
        "max": stats.max,
        "min": stats.min,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn schema() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("title", FieldType::Text),
            FieldDescriptor::new("score", FieldType::Number),
            FieldDescriptor::new("label", FieldType::Class),
        ]
    }

    #[test]
    fn parses_common_parameters() {
        let params = MethodParameters::parse(&json!({
            "subsetId": 3,
            "fields": ["title"],
            "processing": {"stopwords": {"words": ["foo"]}},
            "method": {"query": "bar"}
        }))
        .unwrap();
        assert_eq!(params.subset_id, SubsetId(3));
        assert_eq!(params.method["query"], "bar");

        let defaults = Stopwords {
            language: "en".into(),
            words: vec!["baz".into()],
        };
        let merged = params.stopwords(&defaults);
        assert_eq!(merged.language, "en");
        assert_eq!(merged.words, vec!["baz".to_string(), "foo".to_string()]);
    }

    #[test]
    fn missing_subset_is_a_validation_error() {
        let err = MethodParameters::parse(&json!({"fields": []})).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }

    #[test]
    fn field_resolution() {
        let params = MethodParameters::parse(&json!({"subsetId": 0})).unwrap();
        assert_eq!(
            params.resolve_fields(&schema(), is_textual).unwrap(),
            vec!["title".to_string(), "label".to_string()]
        );

        let params = MethodParameters::parse(&json!({"subsetId": 0, "fields": ["score"]})).unwrap();
        assert!(params.resolve_fields(&schema(), is_textual).is_err());
        let params = MethodParameters::parse(&json!({"subsetId": 0, "fields": ["nope"]})).unwrap();
        assert!(params.resolve_fields(&schema(), |_| true).is_err());
    }

    #[test]
    fn features_stop_at_sign_flip() {
        let space = TextFeatureSpace::fit(Tokenizer::default(), &["a b c d"]).unwrap();
        let weights = array![0.5, -0.2, 0.9, 0.0];
        let positive = top_features(&space, &weights, RankOrder::Descending, 10);
        assert_eq!(
            positive.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            vec!["c", "a"]
        );
        let negative = top_features(&space, &weights, RankOrder::Ascending, 10);
        assert_eq!(negative.len(), 1);
        assert_eq!(negative[0].0, "b");
        assert_eq!(top_features(&space, &weights, RankOrder::Descending, 1).len(), 1);
    }

    #[test]
    fn labels_from_features() {
        let features: Vec<(String, f64)> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|n| ((*n).to_string(), 1.0))
            .collect();
        assert_eq!(feature_label(&features, "x"), "a, b, c, d");
        assert_eq!(feature_label(&[], "positive"), "positive");
    }

    #[test]
    fn processing_written_back() {
        let mut params = json!({"subsetId": 0});
        store_processing(&mut params, &Stopwords::default());
        assert_eq!(params["processing"]["stopwords"]["language"], "none");
    }
}
