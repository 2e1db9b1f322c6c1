use ndarray::Array2;

use crate::error::{PipelineError, Result};

/// Validate a training pair and return its sorted distinct labels.
pub fn check_fit_input(x: &Array2<f32>, y: &[i32]) -> Result<Vec<i32>> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "cannot fit on an empty matrix of shape {:?}",
            x.dim()
        )));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::LengthMismatch {
            what: "y",
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    Ok(classes)
}

/// Reject prediction inputs whose width differs from the fitted width.
pub fn check_n_features(x: &Array2<f32>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::InvalidInput(format!(
            "expected {} features per sample, got {}",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

/// Index of the largest value; the first index wins ties so the smallest
/// class id is chosen.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Position of `label` in a sorted class list.
pub fn class_index(classes: &[i32], label: i32) -> Option<usize> {
    classes.binary_search(&label).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), 1);
        assert_eq!(argmax(&[2.0]), 0);
    }

    #[test]
    fn fit_input_rejects_mismatch() {
        let x = Array2::<f32>::zeros((3, 2));
        assert!(check_fit_input(&x, &[0, 1]).is_err());
        assert_eq!(check_fit_input(&x, &[2, 0, 2]).unwrap(), vec![0, 2]);
    }
}
