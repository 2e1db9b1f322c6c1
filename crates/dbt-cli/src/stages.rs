//! Data-preparation stages run as external commands.
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use dbt_classifiers::config::PipelineConfig;

/// Function tokens handled by an external command.
pub const EXTERNAL_STAGES: [&str; 6] = [
    "update_paths",
    "cleanse_data",
    "generate_pngs",
    "update_column_index",
    "sort_rows",
    "save_tensor",
];

pub fn is_external_stage(name: &str) -> bool {
    EXTERNAL_STAGES.contains(&name)
}

/// Run the command configured for `stage` with `set_type` appended, from the
/// configured working directory.
pub fn run_stage(config: &PipelineConfig, stage: &str, set_type: &str) -> Result<()> {
    let command_line = config.stage_commands.get(stage).ok_or_else(|| {
        anyhow!(
            "No command configured for stage '{}'; set stage_commands.{} in the config file",
            stage,
            stage
        )
    })?;

    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("Empty command configured for stage '{}'", stage))?;

    log::info!("Running {} stage: {} {}", stage, command_line, set_type);
    let status = Command::new(program)
        .args(parts)
        .arg(set_type)
        .current_dir(&config.work_dir)
        .status()
        .with_context(|| format!("Failed to launch '{}' for stage '{}'", program, stage))?;

    if !status.success() {
        bail!("Stage '{}' failed with {}", stage, status);
    }
    Ok(())
}
