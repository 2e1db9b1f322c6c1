//! Headered CSV reader for flattened image partitions.
//!
//! Layout: `PatientID`, `Label`, then one column per pixel in row-major order.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ndarray::Array2;

use crate::config::DataConfig;
use crate::data_handling::{Dataset, DatasetProvider};

const PATIENT_ID_COLUMN: &str = "PatientID";
const LABEL_COLUMN: &str = "Label";

/// Read one partition into a `Dataset` of `(rows, cols)` images.
pub fn read_image_table<P: AsRef<Path>>(path: P, image_shape: (usize, usize)) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(&path)
        .with_context(|| format!("Failed to open image table: {}", path.as_ref().display()))?;

    let headers = reader
        .headers()
        .context("Failed to read image table header row")?
        .clone();

    let id_idx = headers
        .iter()
        .position(|h| h.trim() == PATIENT_ID_COLUMN)
        .ok_or_else(|| anyhow!("Missing '{}' column", PATIENT_ID_COLUMN))?;
    let label_idx = headers
        .iter()
        .position(|h| h.trim() == LABEL_COLUMN)
        .ok_or_else(|| anyhow!("Missing '{}' column", LABEL_COLUMN))?;
    let pixel_indices: Vec<usize> = (0..headers.len())
        .filter(|&i| i != id_idx && i != label_idx)
        .collect();

    let (rows, cols) = image_shape;
    if pixel_indices.len() != rows * cols {
        return Err(anyhow!(
            "{} pixel columns in {} do not match image shape ({}, {})",
            pixel_indices.len(),
            path.as_ref().display(),
            rows,
            cols
        ));
    }

    let mut images = Vec::new();
    let mut labels = Vec::new();
    let mut patient_ids = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;

        let label = record
            .get(label_idx)
            .ok_or_else(|| anyhow!("Missing label value at row {}", row_idx + 1))?
            .trim()
            .parse::<i32>()
            .with_context(|| format!("Invalid label at row {}", row_idx + 1))?;
        let patient_id = record.get(id_idx).unwrap_or_default().trim().to_string();

        let pixels = pixel_indices
            .iter()
            .map(|&i| {
                record
                    .get(i)
                    .unwrap_or_default()
                    .trim()
                    .parse::<f32>()
                    .with_context(|| format!("Invalid pixel in column {} at row {}", i, row_idx + 1))
            })
            .collect::<Result<Vec<f32>>>()?;

        images.push(Array2::from_shape_vec((rows, cols), pixels)?);
        labels.push(label);
        patient_ids.push(patient_id);
    }

    Ok(Dataset::new(images, labels, Some(patient_ids))?)
}

/// Provider backed by one CSV file per partition.
#[derive(Debug, Clone)]
pub struct CsvDatasetProvider {
    pub train_file: PathBuf,
    pub test_file: PathBuf,
    pub image_shape: (usize, usize),
}

impl CsvDatasetProvider {
    /// Build a provider from a config whose paths are relative to `root`.
    pub fn from_config(root: &Path, data: &DataConfig) -> Self {
        Self {
            train_file: root.join(&data.train_file),
            test_file: root.join(&data.test_file),
            image_shape: (data.image_shape[0], data.image_shape[1]),
        }
    }
}

impl DatasetProvider for CsvDatasetProvider {
    fn load_training(&self) -> Result<Dataset> {
        read_image_table(&self.train_file, self.image_shape)
            .with_context(|| format!("Failed to load training data from {}", self.train_file.display()))
    }

    fn load_testing(&self) -> Result<Dataset> {
        read_image_table(&self.test_file, self.image_shape)
            .with_context(|| format!("Failed to load testing data from {}", self.test_file.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_table(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_images_labels_and_ids() {
        let file = write_table("PatientID,Label,p0,p1,p2,p3\nDBT-1,0,1,2,3,4\nDBT-2,1,5,6,7,8\n");
        let ds = read_image_table(file.path(), (2, 2)).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.labels, vec![0, 1]);
        assert_eq!(ds.patient_id(1), Some("DBT-2"));
        assert_eq!(ds.images[1][(1, 0)], 7.0);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let file = write_table("PatientID,Label,p0,p1,p2\nDBT-1,0,1,2,3\n");
        assert!(read_image_table(file.path(), (2, 2)).is_err());
    }

    #[test]
    fn rejects_bad_label() {
        let file = write_table("PatientID,Label,p0\nDBT-1,benign,1\n");
        let err = read_image_table(file.path(), (1, 1)).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid label at row 1"));
    }

    #[test]
    fn missing_file_propagates() {
        let provider = CsvDatasetProvider {
            train_file: PathBuf::from("/nonexistent/train.csv"),
            test_file: PathBuf::from("/nonexistent/test.csv"),
            image_shape: (1, 1),
        };
        assert!(provider.load_training().is_err());
        assert!(provider.load_testing().is_err());
    }
}
