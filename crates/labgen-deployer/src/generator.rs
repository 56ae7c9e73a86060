//! Generation runs: resolve, assemble and write every unit concurrently.

use crate::bundle::{Unit, assemble, translator_for};
use crate::writer::BundleWriter;
use futures::future::join_all;
use labgen_config::ValidationErrors;
use labgen_core::{Backend, Error, ResolvedAssignment, UnifiedConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Written {
        path: PathBuf,
        services: Vec<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub unit: Unit,
    #[serde(flatten)]
    pub status: UnitStatus,
}

impl UnitReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, UnitStatus::Written { .. })
    }
}

/// Result of a generation run, one entry per unit in unit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    pub backend: Backend,
    pub assignment: ResolvedAssignment,
    pub units: Vec<UnitReport>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.units.iter().all(UnitReport::is_success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| !u.is_success())
    }
}

/// Drives a generation run against a [`BundleWriter`].
pub struct Generator<W: BundleWriter + 'static> {
    writer: Arc<W>,
}

impl<W: BundleWriter + 'static> Generator<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(writer),
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Generate every unit of a validated configuration.
    ///
    /// Units are independent: a failure in one is reported and never stops
    /// the others.
    pub async fn generate(&self, config: UnifiedConfig) -> GenerationReport {
        let assignment = ResolvedAssignment::resolve(&config);
        for (service, machines) in assignment.iter() {
            debug!(service, ?machines, "Resolved assignment");
        }

        let config = Arc::new(config);
        let shared = Arc::new(assignment);
        let units = Unit::all(&config);

        let handles = units.iter().cloned().map(|unit| {
            let config = config.clone();
            let assignment = shared.clone();
            let writer = self.writer.clone();
            tokio::spawn(async move { Self::generate_unit(&config, &assignment, &unit, writer.as_ref()).await })
        });
        let results = join_all(handles).await;

        let units = units
            .into_iter()
            .zip(results)
            .map(|(unit, joined)| {
                let outcome = joined
                    .map_err(|e| Error::Internal(format!("generation task failed: {}", e)))
                    .and_then(|r| r);
                let status = match outcome {
                    Ok((path, services)) => {
                        info!(%unit, path = %path.display(), services = services.len(), "Unit generated");
                        UnitStatus::Written { path, services }
                    }
                    Err(e) => {
                        error!(%unit, error = %e, "Unit failed");
                        UnitStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                UnitReport { unit, status }
            })
            .collect();

        GenerationReport {
            backend: config.backend,
            assignment: Arc::unwrap_or_clone(shared),
            units,
        }
    }

    /// Validate a raw document, then generate it.
    pub async fn generate_str(&self, raw: &str) -> Result<GenerationReport, ValidationErrors> {
        let validated = labgen_config::validate(raw)?;
        Ok(self.generate(validated.config).await)
    }

    async fn generate_unit(
        config: &UnifiedConfig,
        assignment: &ResolvedAssignment,
        unit: &Unit,
        writer: &W,
    ) -> labgen_core::Result<(PathBuf, Vec<String>)> {
        let translator = translator_for(config.backend);
        let bundle = assemble(config, assignment, unit, translator.as_ref())?;
        let path = writer.write(&bundle).await?;
        Ok((path, bundle.services))
    }
}
