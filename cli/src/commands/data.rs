//forge/cli/src/commands/data.rs

use anyhow::{Context, Result};
use colored::Colorize;
use forge_federated::synthetic;
use std::path::Path;

use super::load_config;

/// Write a seeded synthetic patient CSV
pub fn execute(config_path: Option<&Path>, output: Option<&Path>, rows: usize, seed: u64) -> Result<()> {
    let config = load_config(config_path)?;
    let output = output.unwrap_or(config.dataset.path.as_path());

    let data = synthetic::generate(rows, seed, &config.training.schema);
    synthetic::write_patient_csv(output, &data)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{} wrote {} rows to {}",
        "✓".green(),
        data.len(),
        output.display().to_string().cyan()
    );
    Ok(())
}
