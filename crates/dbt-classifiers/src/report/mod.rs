//! Output layout and the evaluation reporter.
pub mod plots;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data_handling::Dataset;
use crate::error::Result;
use crate::metrics::{ConfusionMatrix, MetricsBundle};
use crate::models::classifier_trait::Classifier;
use crate::models::Model;

/// The `tmp/` tree every run writes into.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new<P: AsRef<Path>>(work_dir: P) -> Self {
        OutputLayout {
            root: work_dir.as_ref().join("tmp"),
        }
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.root.join("plots")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create all output directories.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [self.models_dir(), self.plots_dir(), self.output_dir(), self.logs_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// `plots/{TYPE}-confusion-matrix-for-{split}-data.png`
    pub fn plot_file_name(&self, split: EvalSplit, token: &str) -> PathBuf {
        self.plots_dir()
            .join(format!("{}-confusion-matrix-for-{}-data.png", token, split.name()))
    }

    /// `output/{TYPE}-{idx}-original-{label}-predict-{predicted}.png`
    pub fn image_file_name(&self, token: &str, idx: usize, label: i32, predicted: i32) -> PathBuf {
        self.output_dir()
            .join(format!("{}-{}-original-{}-predict-{}.png", token, idx, label, predicted))
    }

    /// Log file stem for a model type, `{TYPE}-summary`.
    pub fn summary_log_name(token: &str) -> String {
        format!("{}-summary", token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalSplit {
    Validation,
    Test,
}

impl EvalSplit {
    pub fn name(&self) -> &'static str {
        match self {
            EvalSplit::Validation => "validation",
            EvalSplit::Test => "test",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            EvalSplit::Validation => "Confusion Matrix for Validation Data",
            EvalSplit::Test => "Confusion Matrix for Test Data",
        }
    }
}

/// What one evaluation produced.
#[derive(Debug, Clone)]
pub struct EvaluationSummary {
    pub confidence: f64,
    pub validation: MetricsBundle,
    pub test: MetricsBundle,
    pub test_predictions: Vec<i32>,
    pub plots: Vec<PathBuf>,
    pub samples: Vec<PathBuf>,
}

/// Scores a fitted model on the validation split and the test set, then
/// renders confusion matrices and sample predictions into an [`OutputLayout`].
pub struct EvaluationReporter<'a> {
    layout: &'a OutputLayout,
    token: &'a str,
    max_samples: usize,
    sample_seed: Option<u64>,
}

impl<'a> EvaluationReporter<'a> {
    pub fn new(layout: &'a OutputLayout, token: &'a str, max_samples: usize, sample_seed: Option<u64>) -> Self {
        EvaluationReporter {
            layout,
            token,
            max_samples,
            sample_seed,
        }
    }

    pub fn evaluate(
        &self,
        model: &Model,
        x_val: &Array2<f32>,
        y_val: &[i32],
        test: &Dataset,
    ) -> Result<EvaluationSummary> {
        let confidence = model.score(x_val, y_val)?;
        log::info!("Model accuracy: {}", confidence);

        let y_pred = model.predict(x_val)?;
        let validation = MetricsBundle::compute(y_val, &y_pred)?;
        log::info!("Precision: {:.2}", validation.precision);
        log::info!("Recall: {:.2}", validation.recall);
        log::info!("F1-score: {:.2}", validation.f1);

        let x_test = test.flatten();
        let test_predictions = model.predict(&x_test)?;
        log::info!("Predicted labels for test image: {:?}", test_predictions);

        log::info!("Calculating Accuracy of trained Classifier...");
        log::info!("Trained Classifier Confidence: {}", confidence);
        if let Some(scores) = model.decision_function(x_val)? {
            log::debug!("Decision function shape on validation data: {:?}", scores.dim());
        }
        log::info!("Predicted Values: {:?}", y_pred);
        log::info!("Accuracy of Classifier on Validation Image Data: {}", validation.accuracy);
        log_matrix("Confusion Matrix:", &validation.confusion);

        let mut plots = vec![self.render_confusion(&validation.confusion, EvalSplit::Validation)?];

        log::info!("Creating Confusion Matrix for Test Data...");
        let test_metrics = MetricsBundle::compute(&test.labels, &test_predictions)?;
        log::info!("Accuracy of Classifier on Test Images: {}", test_metrics.accuracy);
        log_matrix("Confusion Matrix for Test Data:", &test_metrics.confusion);
        plots.push(self.render_confusion(&test_metrics.confusion, EvalSplit::Test)?);

        let samples = self.render_samples(test, &test_predictions)?;

        Ok(EvaluationSummary {
            confidence,
            validation,
            test: test_metrics,
            test_predictions,
            plots,
            samples,
        })
    }

    /// Write the PNG and its interactive companion; returns the PNG path.
    pub fn render_confusion(&self, cm: &ConfusionMatrix, split: EvalSplit) -> Result<PathBuf> {
        let png = self.layout.plot_file_name(split, self.token);
        plots::render_confusion_png(cm, split.title(), &png)?;
        plots::write_plot_html(&plots::plot_confusion_matrix(cm, split.title()), &png.with_extension("html"))?;
        log::debug!("Wrote {}", png.display());
        Ok(png)
    }

    /// `min(n, max_samples)` indices drawn uniformly with replacement from `[0, n)`.
    pub fn sample_indices(&self, n: usize) -> Vec<usize> {
        if n == 0 {
            return Vec::new();
        }
        let mut rng = match self.sample_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        (0..n.min(self.max_samples)).map(|_| rng.gen_range(0..n)).collect()
    }

    /// One annotated render per drawn test index. Indices without an image or
    /// prediction are skipped.
    pub fn render_samples(&self, test: &Dataset, predictions: &[i32]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (idx, i) in self.sample_indices(test.len()).into_iter().enumerate() {
            let (Some(image), Some(&label), Some(&predicted)) =
                (test.images.get(i), test.labels.get(i), predictions.get(i))
            else {
                continue;
            };
            let patient_id = test.patient_id(i).unwrap_or("unknown");

            let caption = [
                format!("PatientID: {}", patient_id),
                format!("Actual Label: {}", label),
                format!("Model Predicted Label: {}", predicted),
            ];

            let png = self.layout.image_file_name(self.token, idx, label, predicted);
            plots::render_sample_png(image, &caption, &png)?;
            let title = caption.join("<br>");
            plots::write_plot_html(&plots::plot_sample(image, &title), &png.with_extension("html"))?;
            written.push(png);
        }
        log::info!("Rendered {} sample predictions", written.len());
        Ok(written)
    }
}

fn log_matrix(header: &str, cm: &ConfusionMatrix) {
    log::info!("{} labels {:?}", header, cm.labels);
    for row in cm.to_rows() {
        log::info!("    {:?}", row);
    }
}
