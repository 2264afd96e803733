//! K-means clustering runner

use super::{feature_label, features_json, stats_json, top_features};
use crate::error::SessionError;
use miner_engine::{
    kmeans, Distance, EngineError, KMeansOptions, RankOrder, SummaryStats, TextFeatureSpace,
    Tokenizer,
};
use miner_graph::RecordStore;
use miner_protocol::{DocumentId, SubsetId};
use ndarray::Array2;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const MAX_FEATURES: usize = 100;

/// Label of the subset holding rows without any feature
pub const EMPTY_CLUSTER_LABEL: &str = "EMPTY CLUSTER";

/// What the clustering reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringType {
    /// TF-IDF text vectors, cosine distance
    Text,
    /// Raw numeric fields, Euclidean distance
    Number,
}

/// The `method` part of clustering parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusteringOptions {
    /// Input kind
    pub clustering_type: ClusteringType,
    /// Number of clusters
    pub k: usize,
}

impl ClusteringOptions {
    /// Parse and check the options
    ///
    /// # Errors
    /// - `SessionError::Validation` for malformed options or `k == 0`
    pub fn parse(method: &Value) -> Result<Self, SessionError> {
        let options = Self::deserialize(method)
            .map_err(|e| SessionError::validation(format!("invalid clustering options: {e}")))?;
        if options.k == 0 {
            return Err(SessionError::validation("k must be at least 1"));
        }
        Ok(options)
    }
}

/// One fitted cluster
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Member documents
    pub doc_ids: Vec<DocumentId>,
    /// Member distances to the centroid
    pub distances: SummaryStats,
    /// Heaviest centroid features
    pub features: Vec<(String, f64)>,
}

impl Cluster {
    /// Label of the subset holding this cluster
    #[must_use]
    pub fn label(&self, index: usize) -> String {
        feature_label(&self.features, &format!("cluster {}", index + 1))
    }

    /// Result rendering with the output subset
    #[must_use]
    pub fn to_json(&self, subset_id: Option<SubsetId>) -> Value {
        json!({
            "docIds": self.doc_ids,
            "distances": stats_json(&self.distances),
            "features": features_json(&self.features),
            "subsetId": subset_id,
        })
    }
}

/// Clustering outcome
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Fitted clusters in index order
    pub clusters: Vec<Cluster>,
    /// Documents without any feature
    pub empty: Vec<DocumentId>,
    /// Lloyd iterations run
    pub iterations: usize,
}

impl Clustering {
    /// Result rendering; `subsets` holds one id per cluster then the empty one
    #[must_use]
    pub fn to_json(&self, subsets: &[SubsetId], empty_subset: Option<SubsetId>) -> Value {
        let clusters: Vec<Value> = self
            .clusters
            .iter()
            .enumerate()
            .map(|(i, c)| c.to_json(subsets.get(i).copied()))
            .collect();
        let mut result = json!({ "clusters": clusters, "iterations": self.iterations });
        if !self.empty.is_empty() {
            result["empty"] = json!({ "docIds": self.empty, "subsetId": empty_subset });
        }
        result
    }
}

/// Cluster `elements` on `fields`
///
/// # Errors
/// - `EngineError::EmptyInput` when every row is empty
/// - `EngineError::InvalidParameter` when `k` exceeds the non-empty rows
/// - Feature extraction errors for text clustering
pub fn run(
    store: &RecordStore,
    elements: &[DocumentId],
    fields: &[String],
    tokenizer: Tokenizer,
    options: &ClusteringOptions,
) -> Result<Clustering, EngineError> {
    let (data, rows, space) = match options.clustering_type {
        ClusteringType::Text => {
            let texts: Vec<String> = elements
                .iter()
                .map(|&id| store.document(id).map(|d| d.text_of(fields)).unwrap_or_default())
                .collect();
            let space = TextFeatureSpace::fit(tokenizer, &texts)?;
            (space.extract_matrix(&texts).to_dense(), elements.to_vec(), Some(space))
        }
        ClusteringType::Number => {
            let mut data = Array2::zeros((elements.len(), fields.len()));
            for (row, &id) in elements.iter().enumerate() {
                if let Ok(doc) = store.document(id) {
                    for (col, field) in fields.iter().enumerate() {
                        data[[row, col]] = doc.value(field).and_then(|v| v.as_number()).unwrap_or(0.0);
                    }
                }
            }
            (data, elements.to_vec(), None)
        }
    };

    let (kept, empty): (Vec<usize>, Vec<usize>) =
        (0..rows.len()).partition(|&row| data.row(row).iter().any(|v| *v != 0.0));
    if kept.is_empty() {
        return Err(EngineError::EmptyInput);
    }
    let selected = data.select(ndarray::Axis(0), &kept);

    let distance = match options.clustering_type {
        ClusteringType::Text => Distance::Cosine,
        ClusteringType::Number => Distance::Euclid,
    };
    let model = kmeans(&selected, &KMeansOptions::new(options.k, distance))?;

    let clusters = (0..options.k)
        .map(|cluster| {
            let members = model.members(cluster);
            let distances: Vec<f64> = members.iter().map(|&m| model.distances[m]).collect();
            let centroid = model.centroids.row(cluster).to_owned();
            let features = match &space {
                Some(space) => top_features(
                    space,
                    &centroid,
                    RankOrder::Descending,
                    MAX_FEATURES.min(space.dim()),
                ),
                None => fields.iter().cloned().zip(centroid.iter().copied()).collect(),
            };
            Cluster {
                doc_ids: members.iter().map(|&m| rows[kept[m]]).collect(),
                distances: SummaryStats::of(&distances),
                features,
            }
        })
        .collect();

    info!(
        k = options.k,
        iterations = model.iterations,
        empty = empty.len(),
        "clustering finished"
    );
    Ok(Clustering {
        clusters,
        empty: empty.iter().map(|&row| rows[row]).collect(),
        iterations: model.iterations,
    })
}
