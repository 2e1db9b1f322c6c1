pub mod classifier_trait;
pub mod factory;
pub mod knn;
pub mod random_forest;
pub mod svm;
pub mod utils;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use classifier_trait::Classifier;
use knn::KnnClassifier;
use random_forest::RandomForestClassifier;
use svm::SvmClassifier;

/// A classifier of one of the supported families.
///
/// This is the unit the factory hands out and the model store persists; it
/// carries only data (hyper-parameters and fitted state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Model {
    Knn(KnnClassifier),
    Svm(SvmClassifier),
    RandomForest(RandomForestClassifier),
}

impl Model {
    fn inner(&self) -> &dyn Classifier {
        match self {
            Model::Knn(m) => m,
            Model::Svm(m) => m,
            Model::RandomForest(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Model::Knn(m) => m,
            Model::Svm(m) => m,
            Model::RandomForest(m) => m,
        }
    }
}

impl Classifier for Model {
    fn fit(&mut self, x: &Array2<f32>, y: &[i32]) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f32>) -> Result<Vec<i32>> {
        self.inner().predict(x)
    }

    fn score(&self, x: &Array2<f32>, y: &[i32]) -> Result<f64> {
        self.inner().score(x, y)
    }

    fn decision_function(&self, x: &Array2<f32>) -> Result<Option<Array2<f64>>> {
        self.inner().decision_function(x)
    }

    fn classes(&self) -> &[i32] {
        self.inner().classes()
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}
