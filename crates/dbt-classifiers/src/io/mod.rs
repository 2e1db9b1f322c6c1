//! IO utilities for loading image partitions from disk.

pub mod image_table;

pub use image_table::{read_image_table, CsvDatasetProvider};
