use std::fs;
use std::path::Path;

use anyhow::Result;
use dbt_classifiers::config::{ModelType, PipelineConfig};
use dbt_classifiers::data_handling::{Dataset, DatasetProvider};
use dbt_classifiers::inference::PredictionService;
use dbt_classifiers::models::classifier_trait::Classifier;
use dbt_classifiers::persistence::ModelStore;
use dbt_classifiers::pipeline::{train_model, TrainingPipeline};
use dbt_classifiers::report::OutputLayout;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct InMemoryProvider {
    train: Dataset,
    test: Dataset,
}

impl DatasetProvider for InMemoryProvider {
    fn load_training(&self) -> Result<Dataset> {
        Ok(self.train.clone())
    }

    fn load_testing(&self) -> Result<Dataset> {
        Ok(self.test.clone())
    }
}

/// Noisy images where class `c` lights up image row `c`.
fn synthetic(per_class: usize, classes: &[i32], shape: (usize, usize), seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut images = Vec::new();
    let mut labels = Vec::new();
    let mut ids = Vec::new();
    for &label in classes {
        for i in 0..per_class {
            let lit = label as usize % shape.0;
            images.push(Array2::from_shape_fn(shape, |(r, _)| {
                let base = if r == lit { 3.0 } else { 0.0 };
                base + rng.gen_range(0.0..0.5)
            }));
            labels.push(label);
            ids.push(format!("DBT-P{:02}{:03}", label, i));
        }
    }
    Dataset::new(images, labels, Some(ids)).unwrap()
}

fn provider() -> InMemoryProvider {
    InMemoryProvider {
        train: synthetic(20, &[0, 1, 2], (4, 4), 11),
        test: synthetic(3, &[0, 1, 2], (4, 4), 12),
    }
}

fn config(work_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        work_dir: work_dir.to_path_buf(),
        split_seed: Some(42),
        sample_seed: Some(7),
        ..PipelineConfig::default()
    }
}

fn count_with_extension(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().map_or(false, |x| x == ext))
        .count()
}

#[test]
fn every_model_family_trains_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let provider = provider();
    let pipeline = TrainingPipeline::new(&config, &provider);

    for token in ["KNN", "SVM", "RF"] {
        let summary = pipeline.run(&ModelType::from_token(token), token).unwrap();
        assert_eq!(summary.n_train + summary.n_validation, 60);
        assert_eq!(summary.n_validation, 6);
        assert!(summary.artifact.exists());
        let evaluation = &summary.evaluation;
        assert!((0.0..=1.0).contains(&evaluation.validation.accuracy));
        assert!((0.0..=1.0).contains(&evaluation.test.f1));
        assert_eq!(evaluation.test_predictions.len(), 9);
        if token != "SVM" {
            assert_eq!(evaluation.validation.accuracy, 1.0, "{} validation accuracy", token);
            assert_eq!(evaluation.test.accuracy, 1.0, "{} test accuracy", token);
        }
        let rows = summary.evaluation.test.confusion.counts.dim().0;
        assert!(rows >= 3);
        for plot in &summary.evaluation.plots {
            assert!(plot.exists());
            assert!(plot.with_extension("html").exists());
        }
    }

    let layout = pipeline.layout();
    assert!(layout
        .plots_dir()
        .join("SVM-confusion-matrix-for-test-data.png")
        .exists());
    assert_eq!(count_with_extension(&layout.models_dir(), "json"), 3);
}

#[test]
fn sample_renders_are_bounded_by_test_size() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let provider = provider();

    let summary = TrainingPipeline::new(&config, &provider)
        .run(&ModelType::knn(), "KNN")
        .unwrap();
    assert_eq!(summary.evaluation.samples.len(), 9);
    assert_eq!(count_with_extension(&OutputLayout::new(dir.path()).output_dir(), "png"), 9);
}

#[test]
fn reloaded_artifact_predicts_like_the_trained_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let provider = provider();

    let summary = TrainingPipeline::new(&config, &provider)
        .run(&ModelType::random_forest(), "RF")
        .unwrap();

    let store = ModelStore::new(OutputLayout::new(dir.path()).models_dir());
    let reloaded = store.load("RF").unwrap();
    let x_test = provider.test.flatten();
    assert_eq!(reloaded.predict(&x_test).unwrap(), summary.evaluation.test_predictions);

    let service = PredictionService::new(store, "RF");
    assert_eq!(service.predict_dataset(&provider.test), Some(summary.evaluation.test_predictions));
}

#[test]
fn singleton_class_aborts_before_fitting() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut provider = provider();
    let mut lonely = synthetic(1, &[9], (4, 4), 3);
    provider.train.images.append(&mut lonely.images);
    provider.train.labels.append(&mut lonely.labels);

    let err = TrainingPipeline::new(&config, &provider)
        .run(&ModelType::knn(), "KNN")
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Cannot stratify"));
    assert!(!ModelStore::new(OutputLayout::new(dir.path()).models_dir())
        .artifact_path("KNN")
        .exists());
}

#[test]
fn evaluation_failure_keeps_the_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut provider = provider();
    // Test images of another size cannot be scored by the fitted model.
    provider.test = synthetic(2, &[0, 1], (3, 3), 5);

    let result = TrainingPipeline::new(&config, &provider).run(&ModelType::knn(), "KNN");
    assert!(result.is_err());
    assert!(ModelStore::new(OutputLayout::new(dir.path()).models_dir())
        .artifact_path("KNN")
        .exists());
}

#[test]
fn train_model_writes_the_run_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let provider = provider();

    train_model(&config, "KNN", &provider).unwrap();
    train_model(&config, "KNN", &provider).unwrap();

    let logs = OutputLayout::new(dir.path()).logs_dir();
    let current = fs::read_to_string(logs.join("KNN-summary.log")).unwrap();
    assert!(current.contains("KNearestNeighbors with n_neighbors = 5"));
    assert!(current.contains("Reshaped x: (60, 16)"));
    assert!(current.contains("Training done"));
    assert!(logs.join("KNN-summary-prev.log").exists());
}
