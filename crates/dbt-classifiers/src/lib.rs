//! dbt-classifiers: classical classifiers for tomosynthesis image datasets.
//!
//! This crate provides three fixed classifier configurations (KNN, SVM and
//! random forest), dataset shaping and stratified splitting, a data-only
//! model store, evaluation metrics, confusion-matrix and sample-prediction
//! rendering, and the training pipeline that ties them together.
//!
//! Data acquisition is not part of this crate: callers hand the pipeline a
//! [`data_handling::DatasetProvider`].
pub mod config;
pub mod data_handling;
pub mod error;
pub mod inference;
pub mod io;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod report;
pub mod run_log;
pub mod split;
