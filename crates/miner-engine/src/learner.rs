//! Active learner: a classifier plus a label vector over a fixed matrix

use crate::classifier::{Classifier, LinearSvm};
use crate::error::EngineError;
use crate::features::FeatureMatrix;
use ndarray::Array1;

/// Pool-based active learner
#[derive(Debug, Clone)]
pub struct ActiveLearner<C = LinearSvm> {
    matrix: FeatureMatrix,
    labels: Vec<i8>,
    classifier: C,
    trained: bool,
}

impl<C: Classifier> ActiveLearner<C> {
    /// Learner over `matrix` with every row unlabelled
    #[must_use]
    pub fn new(matrix: FeatureMatrix, classifier: C) -> Self {
        let labels = vec![0; matrix.rows()];
        Self {
            matrix,
            labels,
            classifier,
            trained: false,
        }
    }

    /// Feature matrix
    #[inline]
    #[must_use]
    pub fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    /// Label vector (`-1`, `0`, `+1` per row)
    #[inline]
    #[must_use]
    pub fn labels(&self) -> &[i8] {
        &self.labels
    }

    /// Set the label of one row
    ///
    /// # Errors
    /// - `EngineError::InvalidParameter` for an unknown row or a label
    ///   outside `-1..=1`
    pub fn set_label(&mut self, row: usize, label: i8) -> Result<(), EngineError> {
        if !(-1..=1).contains(&label) {
            return Err(EngineError::InvalidParameter(format!(
                "label must be -1, 0 or 1, got {label}"
            )));
        }
        let slot = self.labels.get_mut(row).ok_or_else(|| {
            EngineError::InvalidParameter(format!("row {row} is out of range"))
        })?;
        *slot = label;
        Ok(())
    }

    /// Retrain on the current labels
    ///
    /// # Errors
    /// Propagates classifier training errors; the previous model is kept.
    pub fn retrain(&mut self) -> Result<(), EngineError> {
        self.classifier.fit(&self.matrix, &self.labels)?;
        self.trained = true;
        Ok(())
    }

    /// Whether a model has been trained
    #[inline]
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Margin of every row (zeros before training)
    #[must_use]
    pub fn margins(&self) -> Vec<f64> {
        if !self.trained {
            return vec![0.0; self.matrix.rows()];
        }
        (0..self.matrix.rows())
            .map(|row| self.classifier.decision(&self.matrix, row))
            .collect()
    }

    /// Unlabelled row closest to the decision boundary
    ///
    /// `None` before training or when every row is labelled.
    #[must_use]
    pub fn most_uncertain(&self) -> Option<usize> {
        if !self.trained {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for row in (0..self.matrix.rows()).filter(|&r| self.labels[r] == 0) {
            let distance = self.classifier.decision(&self.matrix, row).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((row, distance));
            }
        }
        best.map(|(row, _)| row)
    }

    /// Classifier feature weights
    #[inline]
    #[must_use]
    pub fn weights(&self) -> &Array1<f64> {
        self.classifier.weights()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn learner() -> ActiveLearner {
        let m = FeatureMatrix::from_dense(&array![
            [1.0, 0.0],
            [0.0, 1.0],
            [0.7, 0.7],
            [0.95, 0.05],
        ]);
        ActiveLearner::new(m, LinearSvm::default())
    }

    #[test]
    fn starts_unlabelled_and_untrained() {
        let l = learner();
        assert_eq!(l.labels(), &[0, 0, 0, 0]);
        assert!(!l.is_trained());
        assert_eq!(l.most_uncertain(), None);
        assert_eq!(l.margins(), vec![0.0; 4]);
    }

    #[test]
    fn uncertainty_picks_boundary_row() {
        let mut l = learner();
        l.set_label(0, 1).unwrap();
        l.set_label(1, -1).unwrap();
        l.retrain().unwrap();
        assert_eq!(l.most_uncertain(), Some(2));
    }

    #[test]
    fn label_validation() {
        let mut l = learner();
        assert!(l.set_label(9, 1).is_err());
        assert!(l.set_label(0, 2).is_err());
        assert!(l.set_label(0, -1).is_ok());
    }

    #[test]
    fn failed_retrain_keeps_untrained_state() {
        let mut l = learner();
        l.set_label(0, 1).unwrap();
        assert_eq!(l.retrain().unwrap_err(), EngineError::DegenerateLabels);
        assert!(!l.is_trained());
    }
}
