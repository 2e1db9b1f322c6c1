//! Classification metrics: accuracy, macro-averaged precision/recall/F1 and
//! the confusion matrix they derive from.
use ndarray::Array2;

use crate::error::{PipelineError, Result};

fn check_lengths(y_true: &[i32], y_pred: &[i32]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(PipelineError::LengthMismatch {
            what: "y_pred",
            expected: y_true.len(),
            actual: y_pred.len(),
        });
    }
    Ok(())
}

/// Fraction of positions where prediction equals truth. Empty input scores 0.
pub fn accuracy(y_true: &[i32], y_pred: &[i32]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    if y_true.is_empty() {
        return Ok(0.0);
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(correct as f64 / y_true.len() as f64)
}

/// Counts where entry `(i, j)` is the number of samples of true class
/// `labels[i]` predicted as `labels[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    /// Sorted union of the true and predicted labels.
    pub labels: Vec<i32>,
    pub counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn new(y_true: &[i32], y_pred: &[i32]) -> Result<Self> {
        check_lengths(y_true, y_pred)?;

        let mut labels: Vec<i32> = y_true.iter().chain(y_pred).copied().collect();
        labels.sort_unstable();
        labels.dedup();

        let k = labels.len();
        let mut counts = Array2::<usize>::zeros((k, k));
        for (t, p) in y_true.iter().zip(y_pred) {
            // Both labels are in the union by construction.
            if let (Ok(i), Ok(j)) = (labels.binary_search(t), labels.binary_search(p)) {
                counts[[i, j]] += 1;
            }
        }

        Ok(ConfusionMatrix { labels, counts })
    }

    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    /// Per-class precision; a class never predicted scores 0.
    pub fn precision_per_class(&self) -> Vec<f64> {
        (0..self.n_classes())
            .map(|j| {
                let predicted = self.counts.column(j).sum();
                ratio(self.counts[[j, j]], predicted)
            })
            .collect()
    }

    /// Per-class recall; a class with no true members scores 0.
    pub fn recall_per_class(&self) -> Vec<f64> {
        (0..self.n_classes())
            .map(|i| {
                let actual = self.counts.row(i).sum();
                ratio(self.counts[[i, i]], actual)
            })
            .collect()
    }

    pub fn f1_per_class(&self) -> Vec<f64> {
        self.precision_per_class()
            .into_iter()
            .zip(self.recall_per_class())
            .map(|(p, r)| if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 })
            .collect()
    }

    pub fn precision_macro(&self) -> f64 {
        mean(&self.precision_per_class())
    }

    pub fn recall_macro(&self) -> f64 {
        mean(&self.recall_per_class())
    }

    pub fn f1_macro(&self) -> f64 {
        mean(&self.f1_per_class())
    }

    /// Row-major counts as nested vectors, the layout plotting expects.
    pub fn to_rows(&self) -> Vec<Vec<usize>> {
        self.counts.rows().into_iter().map(|row| row.to_vec()).collect()
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Metrics of one prediction run.
#[derive(Debug, Clone)]
pub struct MetricsBundle {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
}

impl MetricsBundle {
    pub fn compute(y_true: &[i32], y_pred: &[i32]) -> Result<Self> {
        let confusion = ConfusionMatrix::new(y_true, y_pred)?;
        Ok(MetricsBundle {
            accuracy: accuracy(y_true, y_pred)?,
            precision: confusion.precision_macro(),
            recall: confusion.recall_macro(),
            f1: confusion.f1_macro(),
            confusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_covers_union_of_labels() {
        let y_true = vec![0, 1, 1, 2];
        let y_pred = vec![0, 1, 3, 2];
        let cm = ConfusionMatrix::new(&y_true, &y_pred).unwrap();
        assert_eq!(cm.labels, vec![0, 1, 2, 3]);
        assert_eq!(cm.counts.dim(), (4, 4));
        assert_eq!(cm.counts[[1, 3]], 1);
        assert_eq!(cm.counts.row(1).sum(), 2);
        assert_eq!(cm.counts.row(3).sum(), 0);
    }

    #[test]
    fn perfect_prediction_is_diagonal() {
        let y = vec![4, 2, 2, 7, 4];
        let m = MetricsBundle::compute(&y, &y).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1, 1.0);
        for ((i, j), &c) in m.confusion.counts.indexed_iter() {
            if i != j {
                assert_eq!(c, 0);
            }
        }
    }

    #[test]
    fn macro_scores_match_hand_computation() {
        // class 0: tp=1 fp=1 fn=1; class 1: tp=1 fp=1 fn=1
        let y_true = vec![0, 0, 1, 1];
        let y_pred = vec![0, 1, 0, 1];
        let m = MetricsBundle::compute(&y_true, &y_pred).unwrap();
        assert!((m.accuracy - 0.5).abs() < 1e-12);
        assert!((m.precision - 0.5).abs() < 1e-12);
        assert!((m.recall - 0.5).abs() < 1e-12);
        assert!((m.f1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn never_predicted_class_counts_as_zero() {
        let y_true = vec![0, 1];
        let y_pred = vec![0, 0];
        let cm = ConfusionMatrix::new(&y_true, &y_pred).unwrap();
        assert_eq!(cm.precision_per_class(), vec![0.5, 0.0]);
        assert_eq!(cm.recall_per_class(), vec![1.0, 0.0]);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        assert!(accuracy(&[1, 2], &[1]).is_err());
        assert!(ConfusionMatrix::new(&[1], &[]).is_err());
    }
}
