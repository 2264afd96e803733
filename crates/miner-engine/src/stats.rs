//! Summary statistics

use std::cmp::Ordering;

/// Mean, standard deviation, maximum and minimum of a sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummaryStats {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// Largest value
    pub max: f64,
    /// Smallest value
    pub min: f64,
}

impl SummaryStats {
    /// Statistics of `values`; all zeros for an empty sample
    #[must_use]
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt(),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }
}

/// Median of `values`, `None` for an empty sample
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_sample() {
        let stats = SummaryStats::of(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.mean, 2.5);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.min, 1.0);
        assert!((stats.std - 1.118_033_988_749_895).abs() < 1e-12);
    }

    #[test]
    fn empty_sample_is_zero() {
        assert_eq!(SummaryStats::of(&[]), SummaryStats::default());
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn mean_and_median_lie_within_bounds(values in prop::collection::vec(-1e6f64..1e6, 1..64)) {
                let stats = SummaryStats::of(&values);
                prop_assert!(stats.min <= stats.mean + 1e-6 && stats.mean <= stats.max + 1e-6);
                prop_assert!(stats.std >= 0.0);
                let m = median(&values).unwrap();
                prop_assert!(stats.min <= m && m <= stats.max);
            }
        }
    }
}
