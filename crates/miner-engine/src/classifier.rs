//! Linear binary classifier
//!
//! A soft-margin linear SVM trained with per-example stochastic gradient
//! descent on the hinge loss. Rows labelled `0` are ignored; `+1` and `-1`
//! are the two classes. Positive examples are weighted by `j`.

use crate::error::EngineError;
use crate::features::FeatureMatrix;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Binary classifier over feature matrix rows
pub trait Classifier {
    /// Fit on every row whose label is non-zero
    ///
    /// # Errors
    /// Returns `EngineError` if the labels or shapes cannot be trained on.
    fn fit(&mut self, matrix: &FeatureMatrix, labels: &[i8]) -> Result<(), EngineError>;

    /// Signed margin of one row; positive means the positive class
    fn decision(&self, matrix: &FeatureMatrix, row: usize) -> f64;

    /// Feature weights
    fn weights(&self) -> &Array1<f64>;
}

/// Training options for [`LinearSvm`]
#[derive(Debug, Clone)]
pub struct SvmOptions {
    /// Cost of margin violations
    pub c: f64,
    /// Extra weight of positive examples
    pub j: f64,
    /// Passes over the labelled rows
    pub epochs: usize,
    /// Step size
    pub learning_rate: f64,
    /// Shuffle seed
    pub seed: u64,
}

impl Default for SvmOptions {
    fn default() -> Self {
        Self {
            c: 2.0,
            j: 2.0,
            epochs: 100,
            learning_rate: 0.1,
            seed: 42,
        }
    }
}

impl SvmOptions {
    fn validate(&self) -> Result<(), EngineError> {
        if [self.c, self.j, self.learning_rate]
            .iter()
            .any(|v| v.is_nan() || *v <= 0.0)
        {
            return Err(EngineError::InvalidParameter(
                "c, j and learning_rate must be positive".to_string(),
            ));
        }
        if self.epochs == 0 {
            return Err(EngineError::InvalidParameter("epochs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Linear SVM
#[derive(Debug, Clone)]
pub struct LinearSvm {
    options: SvmOptions,
    weights: Array1<f64>,
    bias: f64,
}

impl LinearSvm {
    /// Untrained model
    #[must_use]
    pub fn new(options: SvmOptions) -> Self {
        Self {
            options,
            weights: Array1::zeros(0),
            bias: 0.0,
        }
    }

    /// Intercept
    #[inline]
    #[must_use]
    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self::new(SvmOptions::default())
    }
}

impl Classifier for LinearSvm {
    fn fit(&mut self, matrix: &FeatureMatrix, labels: &[i8]) -> Result<(), EngineError> {
        self.options.validate()?;
        if labels.len() != matrix.rows() {
            return Err(EngineError::DimensionMismatch {
                expected: matrix.rows(),
                actual: labels.len(),
            });
        }
        let mut rows: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] != 0).collect();
        let has_positive = rows.iter().any(|&i| labels[i] > 0);
        let has_negative = rows.iter().any(|&i| labels[i] < 0);
        if !has_positive || !has_negative {
            return Err(EngineError::DegenerateLabels);
        }

        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let mut weights = Array1::<f64>::zeros(matrix.dim());
        let mut bias = 0.0;
        let l2 = 1.0 / (self.options.c * rows.len() as f64);
        let lr = self.options.learning_rate;

        for epoch in 0..self.options.epochs {
            rows.shuffle(&mut rng);
            let step = lr / (1.0 + epoch as f64 * 0.05);
            for &row in &rows {
                let y = f64::from(labels[row].signum());
                let cost = if y > 0.0 { self.options.j } else { 1.0 };
                let margin = y * (matrix.row_dot(row, &weights) + bias);
                weights *= 1.0 - step * l2;
                if margin < 1.0 {
                    for (col, v) in matrix.row_entries(row) {
                        weights[col] += step * cost * y * v;
                    }
                    bias += step * cost * y;
                }
            }
        }

        self.weights = weights;
        self.bias = bias;
        Ok(())
    }

    fn decision(&self, matrix: &FeatureMatrix, row: usize) -> f64 {
        if self.weights.len() != matrix.dim() {
            return 0.0;
        }
        matrix.row_dot(row, &self.weights) + self.bias
    }

    fn weights(&self) -> &Array1<f64> {
        &self.weights
    }
}
