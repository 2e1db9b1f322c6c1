//! Predictions from a previously trained model.
use ndarray::Array2;

use crate::data_handling::Dataset;
use crate::models::classifier_trait::Classifier;
use crate::persistence::ModelStore;

/// Applies the stored model of one model type. Never retrains and never
/// substitutes another model type.
pub struct PredictionService {
    store: ModelStore,
    token: String,
}

impl PredictionService {
    pub fn new(store: ModelStore, token: &str) -> Self {
        PredictionService {
            store,
            token: token.to_string(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Predict one label per row of `x`, or `None` when no usable model is
    /// stored (the reason is logged).
    pub fn predict(&self, x: &Array2<f32>) -> Option<Vec<i32>> {
        let Some(model) = self.store.try_load(&self.token) else {
            log::error!("Failed to load the model.");
            return None;
        };
        match model.predict(x) {
            Ok(predictions) => {
                log::info!("{:?}", predictions);
                Some(predictions)
            }
            Err(e) => {
                log::error!("Prediction with the {} model failed: {}", self.token, e);
                None
            }
        }
    }

    pub fn predict_dataset(&self, data: &Dataset) -> Option<Vec<i32>> {
        self.predict(&data.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelType;
    use crate::models::factory::build_model;

    #[test]
    fn missing_model_yields_no_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let service = PredictionService::new(ModelStore::new(dir.path()), "KNN");
        assert!(service.predict(&Array2::zeros((2, 4))).is_none());
    }

    #[test]
    fn stored_model_predicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i / 5 * 10 + j) as f32);
        let y: Vec<i32> = (0..10).map(|i| (i / 5) as i32).collect();
        let mut model = build_model(&ModelType::knn());
        model.fit(&x, &y).unwrap();
        store.save(&model, "KNN").unwrap();

        let service = PredictionService::new(store, "KNN");
        assert_eq!(service.predict(&x), Some(y));
    }

    #[test]
    fn width_mismatch_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        let x = Array2::from_shape_fn((10, 2), |(i, j)| (i + j) as f32);
        let y: Vec<i32> = (0..10).map(|i| (i % 2) as i32).collect();
        let mut model = build_model(&ModelType::knn());
        model.fit(&x, &y).unwrap();
        store.save(&model, "KNN").unwrap();

        let service = PredictionService::new(store, "KNN");
        assert!(service.predict(&Array2::zeros((1, 3))).is_none());
    }
}
