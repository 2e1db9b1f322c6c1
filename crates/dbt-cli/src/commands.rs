use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, ValueHint};
use dbt_classifiers::config::{load_pipeline_config, ModelType, PipelineConfig};
use dbt_classifiers::data_handling::DatasetProvider;
use dbt_classifiers::inference::PredictionService;
use dbt_classifiers::io::CsvDatasetProvider;
use dbt_classifiers::persistence::ModelStore;
use dbt_classifiers::pipeline::train_model;
use dbt_classifiers::report::OutputLayout;

use crate::stages::{is_external_stage, run_stage};

/// Model type trained by `train_model` unless `--model-type` says otherwise.
pub const DEFAULT_MODEL_TOKEN: &str = "KNN";

/// A recognized function token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    /// Data-preparation stage run as an external command.
    Stage(String),
    TrainModel,
    PredictModel,
}

impl Function {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "train_model" => Some(Function::TrainModel),
            "predict_model" => Some(Function::PredictModel),
            stage if is_external_stage(stage) => Some(Function::Stage(stage.to_string())),
            _ => None,
        }
    }
}

/// Strict `--model-type` parser; normalizes to the canonical token.
pub fn parse_model_token(value: &str) -> std::result::Result<String, String> {
    value
        .parse::<ModelType>()
        .map(|model_type| model_type.token().to_string())
        .map_err(|e| e.to_string())
}

pub fn build_cli() -> Command {
    Command::new("dbt")
        .version(clap::crate_version!())
        .about("Train and evaluate classical classifiers on tomosynthesis image sets")
        .arg_required_else_help(true)
        .arg(
            Arg::new("set_type")
                .help("Dataset partition the function operates on (e.g. train, validation)")
                .required(true),
        )
        .arg(
            Arg::new("fn_name")
                .help(
                    "Function to run: update_paths, cleanse_data, generate_pngs, \
                     update_column_index, sort_rows, train_model, predict_model, save_tensor",
                )
                .required(true),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a JSON pipeline configuration file")
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("model_type")
                .short('m')
                .long("model-type")
                .help("Classifier to train or use for prediction: KNN, SVM or RF")
                .value_parser(parse_model_token),
        )
}

/// Load the config file if one was given, otherwise the defaults, with
/// `{set_type}` substituted into the data paths.
pub fn load_config(path: Option<&Path>, set_type: &str) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => load_pipeline_config(path)?,
        None => {
            let config = PipelineConfig::default();
            log::debug!("No config file provided, using defaults: {:?}", config);
            config
        }
    };
    config.data = config.data.with_set_type(set_type);
    Ok(config)
}

fn provider_for(config: &PipelineConfig) -> CsvDatasetProvider {
    CsvDatasetProvider::from_config(&config.work_dir, &config.data)
}

pub fn run_train(config: &PipelineConfig, token: &str) -> Result<()> {
    let summary = train_model(config, token, &provider_for(config))?;
    log::info!(
        "{} model saved to {} (validation accuracy {:.4}, test accuracy {:.4})",
        summary.token,
        summary.artifact.display(),
        summary.evaluation.validation.accuracy,
        summary.evaluation.test.accuracy
    );
    Ok(())
}

/// Predict the configured test partition with the stored model. A missing
/// model is reported by the prediction service and is not an error here.
pub fn run_predict(config: &PipelineConfig, token: &str) -> Result<Option<Vec<i32>>> {
    let test = provider_for(config)
        .load_testing()
        .context("Failed to load data to predict")?;
    let store = ModelStore::new(OutputLayout::new(&config.work_dir).models_dir());
    Ok(PredictionService::new(store, token).predict_dataset(&test))
}

/// Execute `function` for `set_type`.
pub fn dispatch(function: &Function, set_type: &str, matches: &ArgMatches) -> Result<()> {
    let config = load_config(
        matches.get_one::<PathBuf>("config").map(|p| p.as_path()),
        set_type,
    )?;
    let token = matches
        .get_one::<String>("model_type")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_MODEL_TOKEN);

    match function {
        Function::Stage(stage) => run_stage(&config, stage, set_type),
        Function::TrainModel => run_train(&config, token),
        Function::PredictModel => run_predict(&config, token).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn function_tokens() {
        assert_eq!(Function::parse("train_model"), Some(Function::TrainModel));
        assert_eq!(Function::parse("predict_model"), Some(Function::PredictModel));
        assert_eq!(
            Function::parse("sort_rows"),
            Some(Function::Stage("sort_rows".to_string()))
        );
        assert_eq!(Function::parse("train"), None);
    }

    #[test]
    fn model_type_flag_is_strict() {
        assert_eq!(parse_model_token("svm").unwrap(), "SVM");
        assert_eq!(parse_model_token("random_forest").unwrap(), "RF");
        assert!(parse_model_token("MLP").is_err());
    }

    #[test]
    fn set_type_is_substituted_into_data_paths() {
        let config = load_config(None, "validation").unwrap();
        assert_eq!(config.data.train_file, "tmp/data/validation-train.csv");
        assert_eq!(config.data.test_file, "tmp/data/validation-test.csv");
    }

    #[test]
    fn arguments_are_parsed() {
        let matches = build_cli()
            .try_get_matches_from(["dbt", "train", "train_model", "--model-type", "rf"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("set_type").unwrap(), "train");
        assert_eq!(matches.get_one::<String>("model_type").unwrap(), "RF");
    }
}
