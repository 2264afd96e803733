//! Active learning runner
//!
//! Labelling runs in two phases. While the model is not initialized,
//! candidates come from a similarity search around the query: most similar
//! first, switching to least similar once more than two positives are
//! known. As soon as both classes have more than two labels the classifier
//! is trained and candidates come from uncertainty sampling instead.

use super::{feature_label, features_json, stats_json, top_features};
use crate::error::SessionError;
use miner_engine::{
    ActiveLearner, EngineError, FeatureMatrix, LinearSvm, RankOrder, SummaryStats,
    TextFeatureSpace, Tokenizer,
};
use miner_graph::RecordStore;
use miner_protocol::{DocumentId, SubsetId};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Candidates fetched per similarity search
const SEED_BATCH: usize = 10;

/// Labels per class required before the model is trained
const SEED_THRESHOLD: usize = 2;

/// Upper bound on reported discriminative features
const MAX_FEATURES: usize = 100;

/// Where the current candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Most similar to the query first
    SimilarityDescending,
    /// Least similar to the query first
    SimilarityAscending,
    /// Closest to the decision boundary
    Uncertainty,
}

impl From<RankOrder> for CandidateSource {
    fn from(order: RankOrder) -> Self {
        match order {
            RankOrder::Descending => Self::SimilarityDescending,
            RankOrder::Ascending => Self::SimilarityAscending,
        }
    }
}

/// One entry of the labelling history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelledDocument {
    /// Labelled document
    pub document_id: DocumentId,
    /// Current label
    pub label: i8,
}

/// Positive and negative label counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    /// Documents labelled `+1`
    pub positive: usize,
    /// Documents labelled `-1`
    pub negative: usize,
}

/// Paged similarity search feeding the seed phase
#[derive(Debug, Clone)]
struct SeedSearch {
    order: RankOrder,
    batch: Vec<usize>,
    position: usize,
    offset: usize,
    produced_descending: usize,
    produced_ascending: usize,
}

impl SeedSearch {
    fn new() -> Self {
        Self {
            order: RankOrder::Descending,
            batch: Vec::new(),
            position: 0,
            offset: 0,
            produced_descending: 0,
            produced_ascending: 0,
        }
    }

    fn produced(&self, order: RankOrder) -> usize {
        match order {
            RankOrder::Descending => self.produced_descending,
            RankOrder::Ascending => self.produced_ascending,
        }
    }

    fn next(
        &mut self,
        matrix: &FeatureMatrix,
        query: &Array1<f64>,
        positives: usize,
    ) -> Result<Option<usize>, EngineError> {
        let order = if positives > SEED_THRESHOLD {
            RankOrder::Ascending
        } else {
            RankOrder::Descending
        };
        if order != self.order {
            debug!(?order, "seed search switched direction");
            self.order = order;
            self.batch.clear();
            self.position = 0;
            self.offset = self.produced(order);
        }
        if self.position >= self.batch.len() {
            self.batch = matrix
                .rank_by_similarity(query, order, self.offset, SEED_BATCH)?
                .into_iter()
                .map(|(row, _)| row)
                .collect();
            self.offset += self.batch.len();
            self.position = 0;
        }
        let row = self.batch.get(self.position).copied();
        if row.is_some() {
            self.position += 1;
            match order {
                RankOrder::Descending => self.produced_descending += 1,
                RankOrder::Ascending => self.produced_ascending += 1,
            }
        }
        Ok(row)
    }
}

/// One side of a finalized model
#[derive(Debug, Clone)]
pub struct Partition {
    /// Member documents
    pub doc_ids: Vec<DocumentId>,
    /// Distances of the members to their centroid
    pub distances: SummaryStats,
    /// Most discriminative features for this side
    pub features: Vec<(String, f64)>,
}

impl Partition {
    /// Label of the subset holding this partition
    #[must_use]
    pub fn label(&self, fallback: &str) -> String {
        feature_label(&self.features, fallback)
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

/// Outcome of the `train` step
#[derive(Debug, Clone)]
pub struct Finalized {
    /// Label counts at finalization
    pub label_count: LabelCounts,
    /// Explicit or predicted positives
    pub positive: Partition,
    /// Explicit or predicted negatives
    pub negative: Partition,
    /// Every element of the subset
    pub all: Vec<DocumentId>,
}

impl Finalized {
    /// Result rendering once the output subsets exist
    #[must_use]
    pub fn to_json(&self, positive: Option<SubsetId>, negative: Option<SubsetId>) -> Value {
        json!({
            "labelCount": self.label_count,
            "positive": self.positive.to_json(positive),
            "negative": self.negative.to_json(negative),
            "all": { "docIds": self.all },
        })
    }
}

/// Live state of one active-learning method
#[derive(Debug, Clone)]
pub struct ActiveLearningRunner {
    space: TextFeatureSpace,
    learner: ActiveLearner,
    elements: Vec<DocumentId>,
    row_of: HashMap<DocumentId, usize>,
    query: Array1<f64>,
    counts: LabelCounts,
    positive: BTreeSet<DocumentId>,
    negative: BTreeSet<DocumentId>,
    history: Vec<LabelledDocument>,
    model_initialized: bool,
    search: SeedSearch,
    next: Option<DocumentId>,
    next_source: CandidateSource,
}

impl ActiveLearningRunner {
    /// Build the feature space over `elements` and pick the first candidate
    ///
    /// # Errors
    /// Propagates feature extraction failures, e.g. an empty subset or a
    /// vocabulary emptied by stopword removal.
    pub fn init(
        store: &RecordStore,
        elements: &[DocumentId],
        fields: &[String],
        tokenizer: Tokenizer,
        query: &str,
    ) -> Result<Self, EngineError> {
        let texts: Vec<String> = elements
            .iter()
            .map(|&id| store.document(id).map(|doc| doc.text_of(fields)).unwrap_or_default())
            .collect();
        let space = TextFeatureSpace::fit(tokenizer, &texts)?;
        let matrix = space.extract_matrix(&texts);
        let query_vector = space.extract_vector(query);
        if query_vector.iter().all(|w| *w == 0.0) {
            warn!(query, "query has no known terms, seed order falls back to document order");
        }

        let mut runner = Self {
            learner: ActiveLearner::new(matrix, LinearSvm::default()),
            space,
            elements: elements.to_vec(),
            row_of: elements.iter().enumerate().map(|(row, &id)| (id, row)).collect(),
            query: query_vector,
            counts: LabelCounts::default(),
            positive: BTreeSet::new(),
            negative: BTreeSet::new(),
            history: Vec::new(),
            model_initialized: false,
            search: SeedSearch::new(),
            next: None,
            next_source: CandidateSource::SimilarityDescending,
        };
        runner.pick_next()?;
        info!(
            documents = runner.elements.len(),
            features = runner.space.dim(),
            "active learning initialized"
        );
        Ok(runner)
    }

    /// Current candidate
    #[inline]
    #[must_use]
    pub fn next(&self) -> Option<DocumentId> {
        self.next
    }

    /// Origin of the current candidate
    #[inline]
    #[must_use]
    pub fn next_source(&self) -> CandidateSource {
        self.next_source
    }

    /// Whether the classifier has taken over from the seed search
    #[inline]
    #[must_use]
    pub fn model_initialized(&self) -> bool {
        self.model_initialized
    }

    /// Current label counts
    #[inline]
    #[must_use]
    pub fn counts(&self) -> LabelCounts {
        self.counts
    }

    /// Labelling history in first-labelled order
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[LabelledDocument] {
        &self.history
    }

    /// Documents currently labelled positive
    #[inline]
    #[must_use]
    pub fn positive_ids(&self) -> &BTreeSet<DocumentId> {
        &self.positive
    }

    /// Documents currently labelled negative
    #[inline]
    #[must_use]
    pub fn negative_ids(&self) -> &BTreeSet<DocumentId> {
        &self.negative
    }

    /// Record a label and advance to the next candidate
    ///
    /// Relabelling a document moves the counts by exactly one per side.
    ///
    /// # Errors
    /// - `SessionError::Validation` for documents outside the subset or
    ///   labels other than `-1`, `0` and `1`
    /// - `SessionError::Training` if the similarity search fails
    pub fn label(&mut self, document_id: DocumentId, label: i8) -> Result<(), SessionError> {
        if !(-1..=1).contains(&label) {
            return Err(SessionError::validation(format!(
                "label must be -1, 0 or 1, got {label}"
            )));
        }
        let row = *self.row_of.get(&document_id).ok_or_else(|| {
            SessionError::validation(format!("document {document_id} is not part of this method's subset"))
        })?;
        self.learner.set_label(row, label)?;

        if let Some(entry) = self.history.iter_mut().find(|e| e.document_id == document_id) {
            let previous = entry.label;
            entry.label = label;
            self.unapply(previous, document_id);
        } else {
            self.history.push(LabelledDocument { document_id, label });
        }
        self.apply(label, document_id);
        debug!(
            document_id = %document_id,
            label,
            positive = self.counts.positive,
            negative = self.counts.negative,
            "label recorded"
        );

        self.advance()
    }

    fn apply(&mut self, label: i8, id: DocumentId) {
        match label {
            1 => {
                self.counts.positive += 1;
                self.positive.insert(id);
            }
            -1 => {
                self.counts.negative += 1;
                self.negative.insert(id);
            }
            _ => {}
        }
    }

    fn unapply(&mut self, label: i8, id: DocumentId) {
        match label {
            1 => {
                self.counts.positive = self.counts.positive.saturating_sub(1);
                self.positive.remove(&id);
            }
            -1 => {
                self.counts.negative = self.counts.negative.saturating_sub(1);
                self.negative.remove(&id);
            }
            _ => {}
        }
    }

    fn advance(&mut self) -> Result<(), SessionError> {
        if self.model_initialized {
            if let Err(err) = self.learner.retrain() {
                warn!(%err, "retraining failed, keeping the previous model");
            }
        } else if self.counts.positive > SEED_THRESHOLD && self.counts.negative > SEED_THRESHOLD {
            self.learner.retrain()?;
            self.model_initialized = true;
            info!(
                positive = self.counts.positive,
                negative = self.counts.negative,
                "classifier initialized, switching to uncertainty sampling"
            );
        }
        self.pick_next()?;
        Ok(())
    }

    fn pick_next(&mut self) -> Result<(), EngineError> {
        let row = if self.model_initialized {
            self.next_source = CandidateSource::Uncertainty;
            self.learner.most_uncertain()
        } else {
            let row = self
                .search
                .next(self.learner.matrix(), &self.query, self.counts.positive)?;
            self.next_source = self.search.order.into();
            row
        };
        self.next = row.map(|r| self.elements[r]);
        Ok(())
    }

    /// Running statistics reported while the model is initialized
    #[must_use]
    pub fn statistics(&self) -> Value {
        json!({
            "labelCount": self.counts,
            "modelInitialized": self.model_initialized,
            "next": { "documentId": self.next, "source": self.next_source },
        })
    }

    /// Refresh the `method.documents` part of stored parameters
    pub fn write_parameters(&self, parameters: &mut Value) {
        let Value::Object(map) = parameters else {
            return;
        };
        let method = map
            .entry("method")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(method) = method {
            method.insert(
                "documents".to_string(),
                json!({
                    "labelled": self.history,
                    "next": { "documentId": self.next, "label": Value::Null },
                    "nextSource": self.next_source,
                }),
            );
        }
    }

    /// Classify every document and summarize both sides
    ///
    /// Explicit labels win; unlabelled rows with a positive margin are
    /// positive, all others negative. An untrained model is trained first.
    ///
    /// # Errors
    /// Propagates training failures, e.g. when only one class is labelled.
    pub fn finalize(&mut self) -> Result<Finalized, EngineError> {
        if !self.learner.is_trained() {
            self.learner.retrain()?;
        }
        let margins = self.learner.margins();
        let labels = self.learner.labels();

        let (positive_rows, negative_rows): (Vec<usize>, Vec<usize>) = (0..self.elements.len())
            .partition(|&row| labels[row] > 0 || (labels[row] == 0 && margins[row] > 0.0));

        let limit = MAX_FEATURES.min(self.space.dim() / 2);
        let weights = self.learner.weights();
        let positive_features = top_features(&self.space, weights, RankOrder::Descending, limit);
        let negative_features = top_features(&self.space, weights, RankOrder::Ascending, limit);

        info!(
            positive = positive_rows.len(),
            negative = negative_rows.len(),
            "active learning finalized"
        );
        Ok(Finalized {
            label_count: self.counts,
            positive: self.partition(&positive_rows, positive_features),
            negative: self.partition(&negative_rows, negative_features),
            all: self.elements.clone(),
        })
    }

    fn partition(&self, rows: &[usize], features: Vec<(String, f64)>) -> Partition {
        let matrix = self.learner.matrix();
        let centroid = matrix.centroid(rows);
        let distances: Vec<f64> = rows
            .iter()
            .map(|&row| 1.0 - matrix.row_dot(row, &centroid))
            .collect();
        Partition {
            doc_ids: rows.iter().map(|&row| self.elements[row]).collect(),
            distances: SummaryStats::of(&distances),
            features,
        }
    }
}
