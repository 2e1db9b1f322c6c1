//! Support-vector classifier trained with SMO (Sequential Minimal Optimization).
//!
//! Every pair of classes trains its own machine (one-vs-one), so two classes
//! train a single machine. Prediction is a majority vote over the pairwise
//! machines with ties going to the smallest label.
use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::KernelType;
use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::Classifier;
use crate::models::utils::{argmax, check_fit_input, check_n_features};

/// Beyond this the eager kernel matrix would not fit in memory.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Number of consecutive unchanged sweeps that ends SMO.
const MAX_PASSES: usize = 5;

/// One binary machine: f(x) = Σ coef_i K(sv_i, x) + bias, positive for the
/// second class of its pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinarySvm {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i for each support vector.
    dual_coef: Vec<f64>,
    bias: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmClassifier {
    kernel: KernelType,
    c: f64,
    tol: f64,
    max_iter: usize,
    random_state: u64,
    classes: Vec<i32>,
    n_features: usize,
    /// One machine per class pair, ordered as [`class_pairs`] yields them.
    machines: Vec<BinarySvm>,
}

impl SvmClassifier {
    pub fn new(kernel: KernelType, c: f64, tol: f64, max_iter: usize, random_state: u64) -> Self {
        SvmClassifier {
            kernel,
            c,
            tol,
            max_iter,
            random_state,
            classes: Vec::new(),
            n_features: 0,
            machines: Vec::new(),
        }
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.dual_coef.len()).sum()
    }

    fn kernel(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match &self.kernel {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial { degree, gamma, coef0 } => {
                (gamma * a.dot(&b) + coef0).powi(*degree as i32)
            }
            KernelType::Rbf { gamma } => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * sq).exp()
            }
        }
    }

    /// Upper triangle rows computed in parallel, mirrored afterwards.
    fn kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (i..n).map(|j| self.kernel(x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (offset, val) in row.into_iter().enumerate() {
                let j = i + offset;
                k[[i, j]] = val;
                k[[j, i]] = val;
            }
        }
        k
    }

    /// Train one machine on ±1 targets against a precomputed kernel matrix.
    fn smo_train(&self, x: &Array2<f64>, k: &Array2<f64>, y: &[f64]) -> BinarySvm {
        let n = y.len();
        let c = self.c;
        let mut alphas = vec![0.0f64; n];
        let mut bias = 0.0f64;
        let mut rng = StdRng::seed_from_u64(self.random_state);

        let decision = |alphas: &[f64], bias: f64, idx: usize| -> f64 {
            let mut sum = bias;
            for i in 0..n {
                if alphas[i] != 0.0 {
                    sum += alphas[i] * y[i] * k[[i, idx]];
                }
            }
            sum
        };

        let mut passes = 0;
        let mut iter = 0;
        while n > 1 && passes < MAX_PASSES && iter < self.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];
                let violates = (y[i] * e_i < -self.tol && alphas[i] < c)
                    || (y[i] * e_i > self.tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = decision(&alphas, bias, j) - y[j];

                let (alpha_i_old, alpha_j_old) = (alphas[i], alphas[j]);
                let (l, h) = if y[i] != y[j] {
                    ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
                } else {
                    ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
                };
                if (h - l).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                alphas[i] = alpha_i_old + y[i] * y[j] * (alpha_j_old - alphas[j]);

                let b1 = bias
                    - e_i
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, i]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[i, j]];
                let b2 = bias
                    - e_j
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, j]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[j, j]];
                bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                num_changed += 1;
            }

            iter += 1;
            passes = if num_changed == 0 { passes + 1 } else { 0 };
        }

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        let support_vectors = x.select(Axis(0), &support);
        let dual_coef = support.iter().map(|&i| alphas[i] * y[i]).collect();

        BinarySvm {
            support_vectors,
            dual_coef,
            bias,
        }
    }

    fn machine_scores(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let m = self.machines.len();
        let flat: Vec<f64> = (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                self.machines.iter().map(move |machine| {
                    let mut sum = machine.bias;
                    for (sv, coef) in machine.support_vectors.rows().into_iter().zip(&machine.dual_coef) {
                        sum += coef * self.kernel(sv, x.row(i));
                    }
                    sum
                })
            })
            .collect();
        Array2::from_shape_vec((n, m), flat).unwrap_or_else(|_| Array2::zeros((n, m)))
    }
}

/// Class index pairs `(a, b)` with `a < b`, in the order machines are stored.
fn class_pairs(n_classes: usize) -> Vec<(usize, usize)> {
    (0..n_classes)
        .flat_map(|a| (a + 1..n_classes).map(move |b| (a, b)))
        .collect()
}

/// Votes and summed signed confidence per class from one row of pairwise
/// machine values.
fn pairwise_votes(scores: &[f64], n_classes: usize) -> (Vec<f64>, Vec<f64>) {
    let mut votes = vec![0.0; n_classes];
    let mut confidence = vec![0.0; n_classes];
    for (&(a, b), &score) in class_pairs(n_classes).iter().zip(scores) {
        if score > 0.0 {
            votes[b] += 1.0;
        } else {
            votes[a] += 1.0;
        }
        confidence[b] += score;
        confidence[a] -= score;
    }
    (votes, confidence)
}

impl Classifier for SvmClassifier {
    fn fit(&mut self, x: &Array2<f32>, y: &[i32]) -> Result<()> {
        let classes = check_fit_input(x, y)?;
        if classes.len() < 2 {
            return Err(PipelineError::InvalidInput(
                "SVM requires at least 2 distinct classes".to_string(),
            ));
        }
        if x.nrows() > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(PipelineError::InvalidInput(format!(
                "{} samples exceed the {} supported by the SVM kernel matrix",
                x.nrows(),
                MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let x64 = x.mapv(|v| v as f64);
        let k = self.kernel_matrix(&x64);

        self.machines = class_pairs(classes.len())
            .into_iter()
            .map(|(a, b)| {
                let members: Vec<usize> = (0..y.len())
                    .filter(|&i| y[i] == classes[a] || y[i] == classes[b])
                    .collect();
                let targets: Vec<f64> = members
                    .iter()
                    .map(|&i| if y[i] == classes[b] { 1.0 } else { -1.0 })
                    .collect();
                let k_pair = k.select(Axis(0), &members).select(Axis(1), &members);
                self.smo_train(&x64.select(Axis(0), &members), &k_pair, &targets)
            })
            .collect();
        log::debug!(
            "Trained {} pairwise machines with {} support vectors",
            self.machines.len(),
            self.n_support_vectors()
        );

        self.n_features = x.ncols();
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<i32>> {
        if self.machines.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(x, self.n_features)?;
        let scores = self.machine_scores(&x.mapv(|v| v as f64));

        let n_classes = self.classes.len();
        Ok(scores
            .outer_iter()
            .map(|row| {
                let (votes, _) = pairwise_votes(&row.to_vec(), n_classes);
                self.classes[argmax(&votes)]
            })
            .collect())
    }

    /// Raw machine value for two classes, otherwise per-class votes with the
    /// summed pairwise confidence added as a bounded tie-breaker.
    fn decision_function(&self, x: &Array2<f32>) -> Result<Option<Array2<f64>>> {
        if self.machines.is_empty() {
            return Err(PipelineError::ModelNotFitted);
        }
        check_n_features(x, self.n_features)?;
        let scores = self.machine_scores(&x.mapv(|v| v as f64));
        if self.classes.len() == 2 {
            return Ok(Some(scores));
        }

        let n_classes = self.classes.len();
        let mut out = Array2::zeros((scores.nrows(), n_classes));
        for (mut out_row, row) in out.outer_iter_mut().zip(scores.outer_iter()) {
            let (votes, confidence) = pairwise_votes(&row.to_vec(), n_classes);
            for c in 0..n_classes {
                out_row[c] = votes[c] + confidence[c] / (3.0 * (confidence[c].abs() + 1.0));
            }
        }
        Ok(Some(out))
    }

    fn classes(&self) -> &[i32] {
        &self.classes
    }

    fn name(&self) -> &str {
        "SupportVectorMachines"
    }
}
