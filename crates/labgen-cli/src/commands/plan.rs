//! `labgen plan`: print the resolved machine assignment.

use super::{OutputFormat, load};
use anyhow::Result;
use labgen_core::{MachineKey, ResolvedAssignment, UnifiedConfig};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
struct PlanEntry<'a> {
    service: &'a str,
    enabled: bool,
    machines: &'a [MachineKey],
}

fn entries<'a>(config: &'a UnifiedConfig, assignment: &'a ResolvedAssignment) -> Vec<PlanEntry<'a>> {
    assignment
        .iter()
        .map(|(service, machines)| PlanEntry {
            service,
            enabled: config.services.get(service).is_some_and(|s| s.enabled),
            machines,
        })
        .collect()
}

fn render_text(entries: &[PlanEntry<'_>]) -> String {
    let mut out = String::new();
    for entry in entries {
        let machines: Vec<&str> = entry.machines.iter().map(MachineKey::as_str).collect();
        out.push_str(&format!("{} -> {}", entry.service, machines.join(", ")));
        if !entry.enabled {
            out.push_str(" (disabled)");
        }
        out.push('\n');
    }
    out
}

pub fn run(path: &Path, format: OutputFormat) -> Result<bool> {
    let Some(validated) = load(path)? else {
        return Ok(false);
    };
    let config = validated.config;
    let assignment = ResolvedAssignment::resolve(&config);
    let entries = entries(&config, &assignment);

    match format {
        OutputFormat::Text => print!("{}", render_text(&entries)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }
    Ok(true)
}
