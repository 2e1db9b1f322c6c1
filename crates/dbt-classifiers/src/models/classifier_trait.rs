use ndarray::Array2;

use crate::error::Result;
use crate::metrics::accuracy;

/// Contract shared by the classifier families.
///
/// Rows of `x` are flattened images, `y` holds one integer class id per row.
/// A classifier is mutated only by `fit`; every other method borrows it
/// immutably.
pub trait Classifier {
    /// Fit the model on `x`/`y`, replacing any previous fit.
    fn fit(&mut self, x: &Array2<f32>, y: &[i32]) -> Result<()>;

    /// Predict one class id per row.
    fn predict(&self, x: &Array2<f32>) -> Result<Vec<i32>>;

    /// Mean accuracy of `predict(x)` against `y`.
    fn score(&self, x: &Array2<f32>, y: &[i32]) -> Result<f64> {
        let y_pred = self.predict(x)?;
        accuracy(y, &y_pred)
    }

    /// Per-class confidence scores, one column per entry of `classes()`
    /// (a single column for binary SVMs). `None` for families without one.
    fn decision_function(&self, _x: &Array2<f32>) -> Result<Option<Array2<f64>>> {
        Ok(None)
    }

    /// Sorted class ids seen during `fit`; empty before fitting.
    fn classes(&self) -> &[i32];

    fn is_fitted(&self) -> bool {
        !self.classes().is_empty()
    }

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}
