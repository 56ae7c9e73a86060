//! Backend translator trait and descriptor types.
//!
//! A translator turns one service plus its resolved machines into
//! backend-specific descriptors. Translation is pure: it reads the
//! configuration and returns values, it never touches the filesystem.

use crate::model::{Backend, Machine, ServiceSpec, UnifiedConfig};
use crate::{MachineKey, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// A service as seen by a translator.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRef<'a> {
    pub key: &'a str,
    pub spec: &'a ServiceSpec,
}

impl<'a> ServiceRef<'a> {
    pub fn new(key: &'a str, spec: &'a ServiceSpec) -> Self {
        Self { key, spec }
    }
}

/// Where a descriptor is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "machine")]
pub enum Placement {
    /// Into one machine's bundle.
    Machine(MachineKey),
    /// Into the cluster-wide bundle.
    Cluster,
}

/// Output of a translator for one service.
///
/// `service` is the service entry of the descriptor document; `volumes` and
/// `secrets` are the top-level definitions that entry refers to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendServiceDescriptor {
    pub name: String,
    pub placement: Placement,
    pub service: serde_json::Value,
    pub volumes: BTreeMap<String, serde_json::Value>,
    pub secrets: BTreeMap<String, serde_json::Value>,
}

/// Trait for backend translators.
pub trait Translator: Send + Sync {
    /// Backend this translator targets.
    fn backend(&self) -> Backend;

    /// Translate a service for its resolved machines.
    ///
    /// Single-host translators return one descriptor per machine; cluster
    /// translators return exactly one.
    fn translate(
        &self,
        config: &UnifiedConfig,
        service: ServiceRef<'_>,
        machines: &[&Machine],
    ) -> Result<Vec<BackendServiceDescriptor>>;
}
