//! K-nearest-neighbors classifier.
//!
//! Fitting stores the training rows; prediction is a brute-force Euclidean
//! search run on a dedicated rayon pool sized by `n_jobs`.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::NeighborAlgorithm;
use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{argmax, check_fit_input, check_n_features, class_index};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnClassifier {
    n_neighbors: usize,
    algorithm: NeighborAlgorithm,
    n_jobs: usize,
    x_train: Option<Array2<f32>>,
    /// Training labels as positions in `classes`.
    y_train: Vec<usize>,
    classes: Vec<i32>,
}

impl KnnClassifier {
    pub fn new(n_neighbors: usize, algorithm: NeighborAlgorithm, n_jobs: usize) -> Self {
        KnnClassifier {
            n_neighbors,
            algorithm,
            n_jobs,
            x_train: None,
            y_train: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Strategy actually used for the search.
    pub fn effective_algorithm(&self) -> NeighborAlgorithm {
        match self.algorithm {
            NeighborAlgorithm::Auto | NeighborAlgorithm::BruteForce => NeighborAlgorithm::BruteForce,
        }
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs.max(1))
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))
    }
}

/// Max-heap entry keeping the k smallest distances; the lower training index
/// wins equal distances.
#[derive(PartialEq)]
struct Neighbor {
    dist: f64,
    index: usize,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then(self.index.cmp(&other.index))
    }
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&ai, &bi)| {
            let d = ai as f64 - bi as f64;
            d * d
        })
        .sum()
}

fn k_nearest(point: ArrayView1<f32>, x_train: &Array2<f32>, k: usize) -> Vec<usize> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (index, row) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor {
            dist: squared_distance(point, row),
            index,
        };
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(top) = heap.peek() {
            if candidate < *top {
                heap.pop();
                heap.push(candidate);
            }
        }
    }
    heap.into_iter().map(|n| n.index).collect()
}

impl Classifier for KnnClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[i32]) -> Result<()> {
        let classes = check_fit_input(x, y)?;
        if x.nrows() < self.n_neighbors {
            return Err(PipelineError::InvalidInput(format!(
                "n_neighbors = {} exceeds the {} training samples",
                self.n_neighbors,
                x.nrows()
            )));
        }
        self.y_train = y
            .iter()
            .map(|&label| class_index(&classes, label).unwrap_or(0))
            .collect();
        self.x_train = Some(x.to_owned());
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<i32>> {
        let x_train = self.x_train.as_ref().ok_or(PipelineError::ModelNotFitted)?;
        check_n_features(x, x_train.ncols())?;

        let k = self.n_neighbors;
        let n_classes = self.classes.len();
        let pool = self.thread_pool()?;
        log::debug!(
            "{:?} neighbor search for {} queries on {} threads",
            self.effective_algorithm(),
            x.nrows(),
            pool.current_num_threads()
        );

        let predictions = pool.install(|| {
            (0..x.nrows())
                .into_par_iter()
                .map(|i| {
                    let mut votes = vec![0.0f64; n_classes];
                    for idx in k_nearest(x.row(i), x_train, k) {
                        votes[self.y_train[idx]] += 1.0;
                    }
                    self.classes[argmax(&votes)]
                })
                .collect::<Vec<i32>>()
        });

        Ok(predictions)
    }

    fn classes(&self) -> &[i32] {
        &self.classes
    }

    fn name(&self) -> &str {
        "KNearestNeighbors"
    }
}
