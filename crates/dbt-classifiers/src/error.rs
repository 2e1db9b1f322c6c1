use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised by the classifier pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot stratify: {0}")]
    Stratification(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid training input: {0}")]
    InvalidInput(String),

    #[error("Unknown model type: {0}. Valid options are: KNN, SVM, RF")]
    UnknownModelType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Artifact {path} rejected: {reason}")]
    ArtifactSchema { path: String, reason: String },

    #[error("Render error: {0}")]
    Render(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        PipelineError::Render(e.to_string())
    }
}
