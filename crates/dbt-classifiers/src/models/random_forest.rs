//! Random forest of Gini decision trees.
//!
//! Trees are grown on bootstrap samples with a random feature subset per
//! split. Tree `i` draws from an RNG seeded with `random_state + i`, so a fit
//! is reproducible regardless of how rayon schedules the trees. Nodes live in
//! a flat arena, which keeps deep trees cheap to serialize.
use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MaxFeatures;
use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{argmax, check_fit_input, check_n_features, class_index};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    /// Class probabilities, one entry per forest class.
    Leaf { distribution: Vec<f64> },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

/// Parameters shared by every tree of one fit.
struct TreeParams {
    n_classes: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: usize,
}

fn class_counts(indices: &[usize], y: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &i in indices {
        counts[y[i]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Best (threshold, weighted child impurity) for one feature, found by
/// sweeping the node's samples in feature order.
fn best_threshold(
    x: &Array2<f32>,
    y: &[usize],
    indices: &[usize],
    feature: usize,
    n_classes: usize,
) -> Option<(f32, f64)> {
    let mut order: Vec<usize> = indices.to_vec();
    order.sort_by(|&a, &b| {
        x[[a, feature]]
            .partial_cmp(&x[[b, feature]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total = order.len();
    let mut left = vec![0usize; n_classes];
    let mut right = class_counts(&order, y, n_classes);
    let mut best: Option<(f32, f64)> = None;

    for pos in 0..total - 1 {
        let cls = y[order[pos]];
        left[cls] += 1;
        right[cls] -= 1;

        let here = x[[order[pos], feature]];
        let next = x[[order[pos + 1], feature]];
        if here >= next {
            continue;
        }

        let n_left = pos + 1;
        let n_right = total - n_left;
        let impurity = (n_left as f64 * gini(&left, n_left) + n_right as f64 * gini(&right, n_right))
            / total as f64;
        if best.map_or(true, |(_, b)| impurity < b) {
            best = Some((here + (next - here) / 2.0, impurity));
        }
    }
    best
}

impl DecisionTree {
    fn grow(x: &Array2<f32>, y: &[usize], sample_indices: Vec<usize>, params: &TreeParams, rng: &mut StdRng) -> Self {
        let mut nodes: Vec<Node> = Vec::new();
        // (node slot, samples, depth)
        let mut stack = vec![(0usize, sample_indices, 0usize)];
        nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });

        while let Some((slot, indices, depth)) = stack.pop() {
            let counts = class_counts(&indices, y, params.n_classes);
            let parent_impurity = gini(&counts, indices.len());

            let can_split = indices.len() >= params.min_samples_split
                && params.max_depth.map_or(true, |d| depth < d)
                && parent_impurity > 0.0;

            let split = if can_split {
                let candidates = sample(rng, x.ncols(), params.max_features);
                candidates
                    .iter()
                    .filter_map(|feature| {
                        best_threshold(x, y, &indices, feature, params.n_classes)
                            .map(|(threshold, impurity)| (feature, threshold, impurity))
                    })
                    .filter(|&(_, _, impurity)| impurity < parent_impurity)
                    .fold(None, |best: Option<(usize, f32, f64)>, cand| match best {
                        Some(b) if b.2 <= cand.2 => Some(b),
                        _ => Some(cand),
                    })
            } else {
                None
            };

            match split {
                Some((feature, threshold, _)) => {
                    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                        indices.iter().partition(|&&i| x[[i, feature]] <= threshold);
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf {
                        distribution: Vec::new(),
                    });
                    nodes.push(Node::Leaf {
                        distribution: Vec::new(),
                    });
                    nodes[slot] = Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    };
                    stack.push((right, right_idx, depth + 1));
                    stack.push((left, left_idx, depth + 1));
                }
                None => {
                    let n = indices.len().max(1) as f64;
                    nodes[slot] = Node::Leaf {
                        distribution: counts.iter().map(|&c| c as f64 / n).collect(),
                    };
                }
            }
        }

        DecisionTree { nodes }
    }

    fn leaf_distribution(&self, sample: ArrayView1<f32>) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    n_estimators: usize,
    random_state: u64,
    max_depth: Option<usize>,
    min_samples_split: usize,
    max_features: MaxFeatures,
    classes: Vec<i32>,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    pub fn new(
        n_estimators: usize,
        random_state: u64,
        max_depth: Option<usize>,
        min_samples_split: usize,
        max_features: MaxFeatures,
    ) -> Self {
        RandomForestClassifier {
            n_estimators,
            random_state,
            max_depth,
            min_samples_split,
            max_features,
            classes: Vec::new(),
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean leaf distribution across trees, shape `(n_samples, n_classes)`.
    pub fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(x, self.n_features)?;

        let n_classes = self.classes.len();
        let n_trees = self.trees.len() as f64;
        let flat: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .flat_map_iter(|i| {
                let mut acc = vec![0.0f64; n_classes];
                for tree in &self.trees {
                    for (a, p) in acc.iter_mut().zip(tree.leaf_distribution(x.row(i))) {
                        *a += p;
                    }
                }
                acc.into_iter().map(move |a| a / n_trees)
            })
            .collect();

        Array2::from_shape_vec((x.nrows(), n_classes), flat)
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[i32]) -> Result<()> {
        let classes = check_fit_input(x, y)?;
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidInput("n_estimators must be positive".to_string()));
        }

        let y_idx: Vec<usize> = y
            .iter()
            .map(|&label| class_index(&classes, label).unwrap_or(0))
            .collect();
        let params = TreeParams {
            n_classes: classes.len(),
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split.max(2),
            max_features: self.max_features.resolve(x.ncols()),
        };
        let n_samples = x.nrows();
        let base_seed = self.random_state;

        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let bootstrap: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                DecisionTree::grow(x, &y_idx, bootstrap, &params, &mut rng)
            })
            .collect();

        self.n_features = x.ncols();
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<i32>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect())
    }

    fn decision_function(&self, x: &Array2<f32>) -> Result<Option<Array2<f64>>> {
        self.predict_proba(x).map(Some)
    }

    fn classes(&self) -> &[i32] {
        &self.classes
    }

    fn name(&self) -> &str {
        "RandomForestClassifier"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f32>, Vec<i32>) {
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..10 {
            let jitter = i as f32 * 0.05;
            data.extend_from_slice(&[0.0 + jitter, 1.0 - jitter, 0.5]);
            labels.push(0);
            data.extend_from_slice(&[5.0 + jitter, 6.0 - jitter, 0.5]);
            labels.push(1);
            data.extend_from_slice(&[-5.0 - jitter, 9.0 + jitter, 0.5]);
            labels.push(2);
        }
        (Array2::from_shape_vec((30, 3), data).unwrap(), labels)
    }

    #[test]
    fn fits_and_predicts_training_data() {
        let (x, y) = blobs();
        let mut rf = RandomForestClassifier::new(25, 42, None, 2, MaxFeatures::Sqrt);
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_trees(), 25);
        assert_eq!(rf.predict(&x).unwrap(), y);

        let proba = rf.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (30, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn same_seed_gives_identical_forest() {
        let (x, y) = blobs();
        let mut a = RandomForestClassifier::new(10, 42, None, 2, MaxFeatures::Sqrt);
        let mut b = RandomForestClassifier::new(10, 42, None, 2, MaxFeatures::Sqrt);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn max_depth_limits_growth() {
        let (x, y) = blobs();
        let mut rf = RandomForestClassifier::new(3, 1, Some(1), 2, MaxFeatures::All);
        rf.fit(&x, &y).unwrap();
        for tree in &rf.trees {
            assert!(tree.nodes.len() <= 3);
        }
    }

    #[test]
    fn gini_of_pure_and_balanced_nodes() {
        assert_eq!(gini(&[4, 0], 4), 0.0);
        assert!((gini(&[2, 2], 4) - 0.5).abs() < 1e-12);
    }
}
