//! `labgen generate`: write every unit's bundle.

use super::{OutputFormat, load};
use anyhow::Result;
use labgen_deployer::{FsBundleWriter, GenerationReport, Generator, UnitStatus, build_bundles};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

fn render_text(report: &GenerationReport) -> String {
    let mut out = String::new();
    for unit in &report.units {
        match &unit.status {
            UnitStatus::Written { path, services } => {
                let _ = writeln!(
                    out,
                    "✓ {} -> {} ({} service(s))",
                    unit.unit,
                    path.display(),
                    services.len()
                );
            }
            UnitStatus::Failed { error } => {
                let _ = writeln!(out, "✗ {}: {}", unit.unit, error);
            }
        }
    }
    let failed = report.failed().count();
    if failed == 0 {
        let _ = writeln!(out, "Generated {} unit(s)", report.units.len());
    } else {
        let _ = writeln!(out, "{} of {} unit(s) failed", failed, report.units.len());
    }
    out
}

pub async fn run(path: &Path, out: &Path, format: OutputFormat) -> Result<bool> {
    let Some(validated) = load(path)? else {
        return Ok(false);
    };

    info!(config = %path.display(), out = %out.display(), "Generating bundles");
    let generator = Generator::new(FsBundleWriter::new(out));
    let report = generator.generate(validated.config).await;

    match format {
        OutputFormat::Text => print!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(report.is_success())
}

#[derive(Debug, Serialize)]
struct DryRunUnit {
    unit: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Assemble every bundle without touching the output directory.
pub fn dry_run(path: &Path, format: OutputFormat) -> Result<bool> {
    let Some(validated) = load(path)? else {
        return Ok(false);
    };

    let units: Vec<DryRunUnit> = build_bundles(&validated.config)
        .into_iter()
        .map(|(unit, bundle)| match bundle {
            Ok(bundle) => DryRunUnit {
                unit: unit.dir_name().to_string(),
                files: bundle.files.into_iter().map(|f| f.name).collect(),
                error: None,
            },
            Err(e) => DryRunUnit {
                unit: unit.dir_name().to_string(),
                files: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect();

    match format {
        OutputFormat::Text => {
            for unit in &units {
                match &unit.error {
                    None => println!("{}/: {}", unit.unit, unit.files.join(", ")),
                    Some(error) => println!("{}/: failed: {}", unit.unit, error),
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&units)?),
    }
    Ok(units.iter().all(|u| u.error.is_none()))
}
