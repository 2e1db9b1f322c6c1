//! Model artifacts on disk.
//!
//! A fitted [`Model`] is stored as a JSON document that carries a format
//! version and the model-type token next to the model's data. Loading only
//! deserializes data, so reading an artifact never runs embedded code.
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::Model;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ArtifactRef<'a> {
    format_version: u32,
    model_type: &'a str,
    model: &'a Model,
}

#[derive(Deserialize)]
struct Artifact {
    format_version: u32,
    model_type: String,
    model: Model,
}

/// Directory of model artifacts, one file per model-type token.
#[derive(Debug, Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    pub fn new<P: Into<PathBuf>>(models_dir: P) -> Self {
        ModelStore {
            models_dir: models_dir.into(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// `{models_dir}/{token}_DBT.json`
    pub fn artifact_path(&self, token: &str) -> PathBuf {
        self.models_dir.join(format!("{}_DBT.json", token))
    }

    /// Write `model` under `token`, overwriting any previous artifact.
    pub fn save(&self, model: &Model, token: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.models_dir)?;
        let path = self.artifact_path(token);

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(
            &mut writer,
            &ArtifactRef {
                format_version: FORMAT_VERSION,
                model_type: token,
                model,
            },
        )?;
        writer.flush()?;

        log::debug!("Saved {} model to {}", token, path.display());
        Ok(path)
    }

    /// Read the artifact stored under `token`, checking its header.
    pub fn load(&self, token: &str) -> Result<Model> {
        let path = self.artifact_path(token);
        let reader = BufReader::new(File::open(&path)?);
        let artifact: Artifact = serde_json::from_reader(reader)?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(PipelineError::ArtifactSchema {
                path: path.display().to_string(),
                reason: format!(
                    "format version {} is not supported (expected {})",
                    artifact.format_version, FORMAT_VERSION
                ),
            });
        }
        if artifact.model_type != token {
            return Err(PipelineError::ArtifactSchema {
                path: path.display().to_string(),
                reason: format!(
                    "artifact holds a {} model, {} was requested",
                    artifact.model_type, token
                ),
            });
        }
        Ok(artifact.model)
    }

    /// Save then immediately reload, returning the reloaded copy. Any failure
    /// on either leg is fatal to the caller.
    pub fn checkpoint(&self, model: &Model, token: &str) -> Result<Model> {
        let path = self.save(model, token)?;
        let reloaded = self.load(token)?;
        log::info!("Model checkpointed to {}", path.display());
        Ok(reloaded)
    }

    /// Independent load: a missing or unreadable artifact is reported and
    /// yields `None`.
    pub fn try_load(&self, token: &str) -> Option<Model> {
        let path = self.artifact_path(token);
        match self.load(token) {
            Ok(model) => Some(model),
            Err(PipelineError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                log::error!("Error: The file '{}' was not found.", path.display());
                None
            }
            Err(e) => {
                log::error!("Error loading the model file '{}': {}", path.display(), e);
                None
            }
        }
    }
}
