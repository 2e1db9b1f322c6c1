//! Stratified train/validation partitioning.
use std::collections::BTreeMap;

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{PipelineError, Result};

/// Output of [`stratified_split`]; rows of each matrix stay aligned with the
/// matching label vector.
#[derive(Debug, Clone)]
pub struct TrainValSplit {
    pub x_train: Array2<f32>,
    pub y_train: Vec<i32>,
    pub x_val: Array2<f32>,
    pub y_val: Vec<i32>,
}

/// Number of validation samples each class contributes.
///
/// Every class gets the floor of its proportional share; the remaining slots
/// go to the largest fractional parts (larger class first, then smaller
/// label).
fn allocate(class_counts: &BTreeMap<i32, Vec<usize>>, n_total: usize, n_val: usize) -> BTreeMap<i32, usize> {
    let mut alloc = BTreeMap::new();
    let mut remainders = Vec::new();
    let mut assigned = 0;

    for (&label, members) in class_counts {
        let share = members.len() as f64 * n_val as f64 / n_total as f64;
        let base = share.floor() as usize;
        alloc.insert(label, base);
        assigned += base;
        remainders.push((share - base as f64, members.len(), label));
    }

    remainders.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.cmp(&a.1))
            .then(a.2.cmp(&b.2))
    });
    for &(_, size, label) in remainders.iter() {
        if assigned >= n_val {
            break;
        }
        let slot = alloc.entry(label).or_insert(0);
        // Keep at least one member of every class in the train partition.
        if *slot + 1 < size {
            *slot += 1;
            assigned += 1;
        }
    }

    alloc
}

/// Split `x`/`y` so the validation partition mirrors the class proportions
/// of `y`.
///
/// `n_val = ceil(test_fraction * n)`. Fails when a class has fewer than two
/// samples, or when either partition would be smaller than the number of
/// classes. `seed = None` draws a fresh shuffle every call.
pub fn stratified_split(
    x: &Array2<f32>,
    y: &[i32],
    test_fraction: f64,
    seed: Option<u64>,
) -> Result<TrainValSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::Stratification(format!(
            "test fraction must lie in (0, 1), got {}",
            test_fraction
        )));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::LengthMismatch {
            what: "y",
            expected: x.nrows(),
            actual: y.len(),
        });
    }

    let n = y.len();
    let mut by_class: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in y.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    if let Some((label, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(PipelineError::Stratification(format!(
            "the least populated class {} has only {} member; every class needs at least 2",
            label,
            members.len()
        )));
    }

    let n_classes = by_class.len();
    let n_val = (test_fraction * n as f64).ceil() as usize;
    let n_train = n - n_val;
    if n_val < n_classes {
        return Err(PipelineError::Stratification(format!(
            "validation size {} is smaller than the number of classes {}",
            n_val, n_classes
        )));
    }
    if n_train < n_classes {
        return Err(PipelineError::Stratification(format!(
            "train size {} is smaller than the number of classes {}",
            n_train, n_classes
        )));
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let alloc = allocate(&by_class, n, n_val);
    let mut train_idx = Vec::with_capacity(n_train);
    let mut val_idx = Vec::with_capacity(n_val);
    for (label, members) in by_class.iter_mut() {
        members.shuffle(&mut rng);
        let take = alloc.get(label).copied().unwrap_or(0);
        val_idx.extend_from_slice(&members[..take]);
        train_idx.extend_from_slice(&members[take..]);
    }
    train_idx.shuffle(&mut rng);
    val_idx.shuffle(&mut rng);

    Ok(TrainValSplit {
        x_train: x.select(Axis(0), &train_idx),
        y_train: train_idx.iter().map(|&i| y[i]).collect(),
        x_val: x.select(Axis(0), &val_idx),
        y_val: val_idx.iter().map(|&i| y[i]).collect(),
    })
}
