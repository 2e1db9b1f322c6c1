//! Training pipeline: load, shape, split, fit, checkpoint, evaluate.
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::{ModelType, PipelineConfig};
use crate::data_handling::{Dataset, DatasetProvider};
use crate::models::classifier_trait::Classifier;
use crate::models::factory::build_model;
use crate::persistence::ModelStore;
use crate::report::{EvaluationReporter, EvaluationSummary, OutputLayout};
use crate::run_log::{rotate_log, RunLogGuard};
use crate::split::stratified_split;

/// Result of a completed training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub token: String,
    pub artifact: PathBuf,
    pub n_train: usize,
    pub n_validation: usize,
    pub evaluation: EvaluationSummary,
}

pub struct TrainingPipeline<'a, P: DatasetProvider + ?Sized> {
    config: &'a PipelineConfig,
    provider: &'a P,
    layout: OutputLayout,
}

impl<'a, P: DatasetProvider + ?Sized> TrainingPipeline<'a, P> {
    pub fn new(config: &'a PipelineConfig, provider: &'a P) -> Self {
        TrainingPipeline {
            config,
            provider,
            layout: OutputLayout::new(&config.work_dir),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    fn load_datasets(&self) -> Result<(Dataset, Dataset)> {
        log::info!("Loading Training Data Set...");
        let train = self.provider.load_training().context("Failed to load training data")?;
        train.log_summary("training");

        log::info!("Loading Testing Data Set...");
        let test = self.provider.load_testing().context("Failed to load testing data")?;
        test.log_summary("test");

        log::info!("Training label distribution: {:?}", train.label_distribution());
        log::info!("Testing label distribution: {:?}", test.label_distribution());
        Ok((train, test))
    }

    /// Train `model_type`, storing artifacts and renders under `token`.
    ///
    /// The fitted model is checkpointed before any evaluation runs, so a
    /// failure while reporting still leaves the artifact on disk.
    pub fn run(&self, model_type: &ModelType, token: &str) -> Result<TrainingSummary> {
        log::info!("Training Starting...");
        self.layout.ensure().context("Failed to create output directories")?;

        let mut model = build_model(model_type);
        let (train, test) = self.load_datasets()?;

        let (n, rows, cols) = train.shape();
        log::info!("Original shape of x: ({}, {}, {})", n, rows, cols);
        log::info!("Original shape of y: ({},)", train.labels.len());
        let x = train.flatten();
        log::info!("Reshaped x: {:?}", x.dim());

        let split = stratified_split(&x, &train.labels, self.config.validation_fraction, self.config.split_seed)
            .context("Failed to split training data")?;
        log::info!(
            "Split into {} training and {} validation samples",
            split.y_train.len(),
            split.y_val.len()
        );

        model
            .fit(&split.x_train, &split.y_train)
            .with_context(|| format!("Failed to fit {}", model.name()))?;

        let store = ModelStore::new(self.layout.models_dir());
        let model = store
            .checkpoint(&model, token)
            .with_context(|| format!("Failed to persist {} model", token))?;

        let reporter = EvaluationReporter::new(&self.layout, token, self.config.max_samples, self.config.sample_seed);
        let evaluation = reporter
            .evaluate(&model, &split.x_val, &split.y_val, &test)
            .context("Failed to evaluate model")?;

        log::info!("Training done");
        Ok(TrainingSummary {
            token: token.to_string(),
            artifact: store.artifact_path(token),
            n_train: split.y_train.len(),
            n_validation: split.y_val.len(),
            evaluation,
        })
    }
}

/// Run the pipeline for a model-type token with the run's narration captured
/// in `tmp/logs/{TYPE}-summary.log`.
///
/// The token selects the configuration leniently (unknown tokens train the
/// random-forest default) and keys every artifact the run writes.
pub fn train_model<P: DatasetProvider + ?Sized>(
    config: &PipelineConfig,
    token: &str,
    provider: &P,
) -> Result<TrainingSummary> {
    let pipeline = TrainingPipeline::new(config, provider);
    let logs_dir = pipeline.layout().logs_dir();
    let log_path = rotate_log(&logs_dir, &OutputLayout::summary_log_name(token))
        .with_context(|| format!("Failed to rotate logs in {}", logs_dir.display()))?;
    let _guard = RunLogGuard::install(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    pipeline.run(&ModelType::from_token(token), token)
}
