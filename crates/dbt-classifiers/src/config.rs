use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Neighbor search strategy for KNN.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborAlgorithm {
    /// Pick a strategy from the data. Dense flattened images always resolve
    /// to brute force.
    Auto,
    BruteForce,
}

/// Kernel function for the support-vector classifier.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = (gamma * x · y + coef0)^degree
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
    /// K(x, y) = exp(-gamma * ||x - y||²)
    Rbf { gamma: f64 },
}

/// Number of candidate features examined at each tree split.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(n) => *n,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Supported classifier families and their hyper-parameters.
///
/// Each variant is immutable once selected; the fixed configurations come from
/// [`ModelType::from_token`] or the `Default`/`FromStr` implementations.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    Knn {
        n_neighbors: usize,
        algorithm: NeighborAlgorithm,
        n_jobs: usize,
    },
    Svm {
        kernel: KernelType,
        c: f64,
        tol: f64,
        max_iter: usize,
        random_state: u64,
    },
    RandomForest {
        n_estimators: usize,
        random_state: u64,
        max_depth: Option<usize>,
        min_samples_split: usize,
        max_features: MaxFeatures,
    },
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::random_forest()
    }
}

impl ModelType {
    pub fn knn() -> Self {
        ModelType::Knn {
            n_neighbors: 5,
            algorithm: NeighborAlgorithm::Auto,
            n_jobs: 10,
        }
    }

    pub fn svm() -> Self {
        ModelType::Svm {
            kernel: KernelType::Polynomial {
                degree: 3,
                gamma: 0.1,
                coef0: 0.0,
            },
            c: 1.0,
            tol: 1e-3,
            max_iter: 1000,
            random_state: 42,
        }
    }

    pub fn random_forest() -> Self {
        ModelType::RandomForest {
            n_estimators: 100,
            random_state: 42,
            max_depth: None,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
        }
    }

    /// Map a model-type token to its configuration.
    ///
    /// Only the exact tokens `KNN` and `SVM` select those families; anything
    /// else trains the random-forest default. Use `str::parse` when an unknown
    /// token should be an error instead.
    pub fn from_token(token: &str) -> Self {
        match token {
            "KNN" => ModelType::knn(),
            "SVM" => ModelType::svm(),
            "RF" => ModelType::random_forest(),
            _ => {
                log::warn!(
                    "Unrecognized model type '{}', falling back to RandomForestClassifier",
                    token
                );
                ModelType::random_forest()
            }
        }
    }

    /// Canonical token for this family.
    pub fn token(&self) -> &'static str {
        match self {
            ModelType::Knn { .. } => "KNN",
            ModelType::Svm { .. } => "SVM",
            ModelType::RandomForest { .. } => "RF",
        }
    }

    /// Human readable description of the configuration.
    pub fn describe(&self) -> String {
        match self {
            ModelType::Knn {
                n_neighbors,
                algorithm,
                n_jobs,
            } => format!(
                "KNearestNeighbors with n_neighbors = {}, algorithm = {}, n_jobs = {}",
                n_neighbors,
                match algorithm {
                    NeighborAlgorithm::Auto => "auto",
                    NeighborAlgorithm::BruteForce => "brute",
                },
                n_jobs
            ),
            ModelType::Svm { kernel, .. } => match kernel {
                KernelType::Polynomial { gamma, .. } => {
                    format!("SupportVectorMachines with gamma={}, kernel='poly'", gamma)
                }
                KernelType::Rbf { gamma } => {
                    format!("SupportVectorMachines with gamma={}, kernel='rbf'", gamma)
                }
                KernelType::Linear => "SupportVectorMachines with kernel='linear'".to_string(),
            },
            ModelType::RandomForest {
                n_estimators,
                random_state,
                ..
            } => format!(
                "RandomForestClassifier with n_estimators={}, random_state={}",
                n_estimators, random_state
            ),
        }
    }
}

impl FromStr for ModelType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "knn" => Ok(ModelType::knn()),
            "svm" => Ok(ModelType::svm()),
            "rf" | "random_forest" => Ok(ModelType::random_forest()),
            _ => Err(PipelineError::UnknownModelType(s.to_string())),
        }
    }
}

/// Location and geometry of the two dataset partitions.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// CSV holding the training partition. `{set_type}` is substituted.
    pub train_file: String,
    /// CSV holding the test partition. `{set_type}` is substituted.
    pub test_file: String,
    /// (rows, cols) of every image.
    pub image_shape: [usize; 2],
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_file: "tmp/data/{set_type}-train.csv".to_string(),
            test_file: "tmp/data/{set_type}-test.csv".to_string(),
            image_shape: [64, 64],
        }
    }
}

impl DataConfig {
    pub fn with_set_type(&self, set_type: &str) -> Self {
        Self {
            train_file: self.train_file.replace("{set_type}", set_type),
            test_file: self.test_file.replace("{set_type}", set_type),
            image_shape: self.image_shape,
        }
    }
}

/// Run-level settings for training, evaluation and rendering.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root under which `tmp/{models,plots,output,logs}` live.
    pub work_dir: PathBuf,
    pub validation_fraction: f64,
    /// Upper bound on rendered sample predictions.
    pub max_samples: usize,
    pub split_seed: Option<u64>,
    pub sample_seed: Option<u64>,
    pub data: DataConfig,
    /// External commands for the data-preparation tokens.
    pub stage_commands: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            validation_fraction: 0.1,
            max_samples: 20,
            split_seed: None,
            sample_seed: None,
            data: DataConfig::default(),
            stage_commands: BTreeMap::new(),
        }
    }
}

/// Load a pipeline configuration from a JSON file.
pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: PipelineConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}
