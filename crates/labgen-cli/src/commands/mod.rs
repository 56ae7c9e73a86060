//! CLI command implementations.

pub mod generate;
pub mod plan;

use anyhow::{Context, Result};
use clap::ValueEnum;
use labgen_config::{Validated, ValidationErrors};
use std::path::Path;
use tracing::warn;

/// How reports are printed on stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Read and validate a document. Validation errors are printed and yield
/// `None`; only I/O problems are returned as errors.
pub fn load(path: &Path) -> Result<Option<Validated>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let base_dir = labgen_config::document_dir(path)
        .with_context(|| format!("Failed to resolve directory of {}", path.display()))?;

    match labgen_config::validate_at(&raw, base_dir) {
        Ok(validated) => {
            for warning in &validated.warnings {
                warn!(%warning, "Configuration warning");
            }
            Ok(Some(validated))
        }
        Err(errors) => {
            print_errors(path, &errors);
            Ok(None)
        }
    }
}

fn print_errors(path: &Path, errors: &ValidationErrors) {
    println!(
        "{}: {} error{}",
        path.display(),
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    for error in errors.errors() {
        println!("  [{}] {}", error.kind(), error);
    }
}

pub fn validate(path: &Path) -> Result<bool> {
    let Some(validated) = load(path)? else {
        return Ok(false);
    };
    let config = &validated.config;
    println!(
        "Configuration is valid: {} backend, {} machine(s), {} service(s)",
        config.backend,
        config.machines.len(),
        config.services.len()
    );
    Ok(true)
}
