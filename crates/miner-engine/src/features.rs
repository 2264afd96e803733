//! Feature extraction
//!
//! A [`TextFeatureSpace`] is fitted on a collection of texts (unigrams,
//! TF-IDF weighted) and turns texts into L2-normalised sparse rows of a
//! [`FeatureMatrix`].

use crate::error::EngineError;
use crate::tokenize::Tokenizer;
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use sprs::{CsMat, TriMat};
use std::cmp::Ordering;

/// Sort direction of a similarity ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    /// Most similar first
    Descending,
    /// Least similar first
    Ascending,
}

/// Unigram TF-IDF feature space
#[derive(Debug, Clone)]
pub struct TextFeatureSpace {
    tokenizer: Tokenizer,
    vocabulary: IndexMap<String, usize>,
    idf: Vec<f64>,
}

impl TextFeatureSpace {
    /// Fit the vocabulary and document frequencies on `texts`
    ///
    /// # Errors
    /// - `EngineError::EmptyInput` if there are no texts
    /// - `EngineError::EmptyFeatureSpace` if no token survives stopword removal
    pub fn fit<S: AsRef<str>>(tokenizer: Tokenizer, texts: &[S]) -> Result<Self, EngineError> {
        if texts.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let mut vocabulary = IndexMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();

        for text in texts {
            let mut tokens = tokenizer.tokenize(text.as_ref());
            tokens.sort_unstable();
            tokens.dedup();
            for token in tokens {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(token).or_insert(next);
                if idx == document_frequency.len() {
                    document_frequency.push(0);
                }
                document_frequency[idx] += 1;
            }
        }
        if vocabulary.is_empty() {
            return Err(EngineError::EmptyFeatureSpace);
        }

        let n = texts.len() as f64;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        Ok(Self {
            tokenizer,
            vocabulary,
            idf,
        })
    }

    /// Number of features
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.vocabulary.len()
    }

    /// Word of a feature index
    #[inline]
    #[must_use]
    pub fn feature(&self, idx: usize) -> Option<&str> {
        self.vocabulary.get_index(idx).map(|(word, _)| word.as_str())
    }

    /// Sparse weighted entries of one text, L2-normalised
    fn weights(&self, text: &str) -> Vec<(usize, f64)> {
        let mut counts: IndexMap<usize, f64> = IndexMap::new();
        for token in self.tokenizer.tokenize(text) {
            if let Some(&idx) = self.vocabulary.get(&token) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }
        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut entries {
                *w /= norm;
            }
        }
        entries.sort_unstable_by_key(|(idx, _)| *idx);
        entries
    }

    /// Dense vector of one text
    #[must_use]
    pub fn extract_vector(&self, text: &str) -> Array1<f64> {
        let mut vector = Array1::zeros(self.dim());
        for (idx, w) in self.weights(text) {
            vector[idx] = w;
        }
        vector
    }

    /// Sparse matrix with one row per text
    #[must_use]
    pub fn extract_matrix<S: AsRef<str>>(&self, texts: &[S]) -> FeatureMatrix {
        let mut triplets = TriMat::new((texts.len(), self.dim()));
        for (row, text) in texts.iter().enumerate() {
            for (col, w) in self.weights(text.as_ref()) {
                triplets.add_triplet(row, col, w);
            }
        }
        FeatureMatrix {
            inner: triplets.to_csr(),
        }
    }
}

/// Row-major sparse feature matrix (one row per document)
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    inner: CsMat<f64>,
}

impl FeatureMatrix {
    /// Wrap a dense matrix
    #[must_use]
    pub fn from_dense(dense: &Array2<f64>) -> Self {
        let (rows, cols) = dense.dim();
        let mut triplets = TriMat::new((rows, cols));
        for ((row, col), &value) in dense.indexed_iter() {
            if value != 0.0 {
                triplets.add_triplet(row, col, value);
            }
        }
        Self {
            inner: triplets.to_csr(),
        }
    }

    /// Number of rows
    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.inner.rows()
    }

    /// Number of columns
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.inner.cols()
    }

    /// Non-zero entries of one row
    #[must_use]
    pub fn row_entries(&self, row: usize) -> Vec<(usize, f64)> {
        self.inner
            .outer_view(row)
            .map(|view| view.iter().map(|(col, &v)| (col, v)).collect())
            .unwrap_or_default()
    }

    /// Dot product of a row with a dense vector
    #[must_use]
    pub fn row_dot(&self, row: usize, dense: &Array1<f64>) -> f64 {
        self.inner.outer_view(row).map_or(0.0, |view| {
            view.iter().map(|(col, &v)| v * dense[col]).sum()
        })
    }

    /// Euclidean norm of a row
    #[must_use]
    pub fn row_norm(&self, row: usize) -> f64 {
        self.inner.outer_view(row).map_or(0.0, |view| {
            view.iter().map(|(_, &v)| v * v).sum::<f64>().sqrt()
        })
    }

    /// Dense copy of a row
    #[must_use]
    pub fn dense_row(&self, row: usize) -> Array1<f64> {
        let mut out = Array1::zeros(self.dim());
        for (col, v) in self.row_entries(row) {
            out[col] = v;
        }
        out
    }

    /// Dense copy of the whole matrix
    #[must_use]
    pub fn to_dense(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.rows(), self.dim()));
        for row in 0..self.rows() {
            for (col, v) in self.row_entries(row) {
                out[[row, col]] = v;
            }
        }
        out
    }

    /// Similarity of every row with `query`
    ///
    /// # Errors
    /// - `EngineError::DimensionMismatch` if the query size differs
    pub fn similarity(&self, query: &Array1<f64>) -> Result<Vec<f64>, EngineError> {
        if query.len() != self.dim() {
            return Err(EngineError::DimensionMismatch {
                expected: self.dim(),
                actual: query.len(),
            });
        }
        Ok((0..self.rows()).map(|row| self.row_dot(row, query)).collect())
    }

    /// Rows ranked by similarity with `query`
    ///
    /// Ties keep row order. Returns `(row, score)` pairs after skipping
    /// `offset` and taking at most `count`.
    ///
    /// # Errors
    /// - `EngineError::DimensionMismatch` if the query size differs
    pub fn rank_by_similarity(
        &self,
        query: &Array1<f64>,
        order: RankOrder,
        offset: usize,
        count: usize,
    ) -> Result<Vec<(usize, f64)>, EngineError> {
        let mut scored: Vec<(usize, f64)> = self.similarity(query)?.into_iter().enumerate().collect();
        scored.sort_by(|a, b| {
            let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
            match order {
                RankOrder::Descending => ord.reverse(),
                RankOrder::Ascending => ord,
            }
        });
        Ok(scored.into_iter().skip(offset).take(count).collect())
    }

    /// Mean of the given rows
    #[must_use]
    pub fn centroid(&self, rows: &[usize]) -> Array1<f64> {
        let mut centroid = Array1::zeros(self.dim());
        if rows.is_empty() {
            return centroid;
        }
        for &row in rows {
            for (col, v) in self.row_entries(row) {
                centroid[col] += v;
            }
        }
        centroid / rows.len() as f64
    }
}
