//! Dataset container and the provider contract consumed by the pipeline.
//!
//! A `Dataset` holds parallel sequences of images, integer labels and
//! (for test partitions) patient identifiers. Providers are external: the
//! pipeline only relies on `load_training` and `load_testing`.
use std::collections::BTreeMap;

use ndarray::Array2;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct Dataset {
    pub images: Vec<Array2<f32>>,
    pub labels: Vec<i32>,
    pub patient_ids: Option<Vec<String>>,
}

impl Dataset {
    pub fn new(
        images: Vec<Array2<f32>>,
        labels: Vec<i32>,
        patient_ids: Option<Vec<String>>,
    ) -> Result<Self> {
        if labels.len() != images.len() {
            return Err(PipelineError::LengthMismatch {
                what: "labels",
                expected: images.len(),
                actual: labels.len(),
            });
        }
        if let Some(ids) = &patient_ids {
            if ids.len() != images.len() {
                return Err(PipelineError::LengthMismatch {
                    what: "patient_ids",
                    expected: images.len(),
                    actual: ids.len(),
                });
            }
        }
        if let Some(first) = images.first() {
            let shape = first.dim();
            if let Some((idx, img)) = images.iter().enumerate().find(|(_, img)| img.dim() != shape) {
                return Err(PipelineError::Dataset(format!(
                    "image {} has shape {:?}, expected {:?}",
                    idx,
                    img.dim(),
                    shape
                )));
            }
        }
        Ok(Dataset {
            images,
            labels,
            patient_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Shape of a single image, `(0, 0)` when the dataset is empty.
    pub fn image_shape(&self) -> (usize, usize) {
        self.images.first().map(|img| img.dim()).unwrap_or((0, 0))
    }

    /// Shape of the stacked image tensor, `(N, rows, cols)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        let (rows, cols) = self.image_shape();
        (self.len(), rows, cols)
    }

    /// Flatten each image row-major into one feature row, giving `(N, rows * cols)`.
    pub fn flatten(&self) -> Array2<f32> {
        let (rows, cols) = self.image_shape();
        let n_features = rows * cols;
        let mut data = Vec::with_capacity(self.len() * n_features);
        for img in &self.images {
            data.extend(img.iter().copied());
        }
        // Dataset::new guarantees a uniform shape.
        Array2::from_shape_vec((self.len(), n_features), data)
            .unwrap_or_else(|_| Array2::zeros((0, n_features)))
    }

    /// Count of samples per label, ordered by label.
    pub fn label_distribution(&self) -> BTreeMap<i32, usize> {
        label_distribution(&self.labels)
    }

    pub fn patient_id(&self, idx: usize) -> Option<&str> {
        self.patient_ids
            .as_ref()
            .and_then(|ids| ids.get(idx))
            .map(|s| s.as_str())
    }

    pub fn log_summary(&self, name: &str) {
        log::info!("Shape of {} images: {:?}", name, self.shape());
        log::info!("Shape of {} labels: ({},)", name, self.labels.len());
    }
}

pub fn label_distribution(labels: &[i32]) -> BTreeMap<i32, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

/// Source of the training and test partitions.
pub trait DatasetProvider {
    fn load_training(&self) -> anyhow::Result<Dataset>;
    fn load_testing(&self) -> anyhow::Result<Dataset>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(v: f32) -> Array2<f32> {
        Array2::from_shape_vec((2, 2), vec![v, v + 1.0, v + 2.0, v + 3.0]).unwrap()
    }

    #[test]
    fn flatten_preserves_row_major_order_and_alignment() {
        let ds = Dataset::new(vec![image(0.0), image(10.0)], vec![0, 1], None).unwrap();
        let x = ds.flatten();
        assert_eq!(x.dim(), (2, 4));
        assert_eq!(x.row(1).to_vec(), vec![10.0, 11.0, 12.0, 13.0]);
        assert_eq!(ds.shape(), (2, 2, 2));
    }

    #[test]
    fn rejects_misaligned_sequences() {
        assert!(Dataset::new(vec![image(0.0)], vec![0, 1], None).is_err());
        assert!(Dataset::new(vec![image(0.0)], vec![0], Some(vec![])).is_err());
    }

    #[test]
    fn rejects_mixed_shapes() {
        let odd = Array2::zeros((3, 1));
        assert!(Dataset::new(vec![image(0.0), odd], vec![0, 1], None).is_err());
    }

    #[test]
    fn distribution_counts_each_label() {
        let ds = Dataset::new(
            vec![image(0.0), image(1.0), image(2.0)],
            vec![2, 0, 2],
            Some(vec!["a".into(), "b".into(), "c".into()]),
        )
        .unwrap();
        let dist = ds.label_distribution();
        assert_eq!(dist.get(&0), Some(&1));
        assert_eq!(dist.get(&2), Some(&2));
        assert_eq!(ds.patient_id(1), Some("b"));
    }
}
