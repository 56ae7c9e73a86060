//! Single-host translator (docker compose).

use crate::overrides::{combine, deep_merge};
use crate::volumes::mount_for;
use labgen_core::translator::{BackendServiceDescriptor, Placement, ServiceRef, Translator};
use labgen_core::{Backend, Error, Machine, Result, UnifiedConfig};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Restart policy used unless an override sets one.
pub const DEFAULT_RESTART: &str = "unless-stopped";

const RESTART_POLICIES: &[&str] = &["no", "always", "on-failure", "unless-stopped"];

#[derive(Debug, Serialize)]
struct ComposeService<'a> {
    image: &'a str,
    container_name: &'a str,
    restart: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    secrets: Vec<&'a str>,
    networks: Vec<&'a str>,
}

/// Translates services into compose service entries, one per machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleHostTranslator;

impl SingleHostTranslator {
    pub fn new() -> Self {
        Self
    }

    fn descriptor(
        &self,
        config: &UnifiedConfig,
        service: ServiceRef<'_>,
        machine: &Machine,
    ) -> Result<BackendServiceDescriptor> {
        let spec = service.spec;
        let mut overrides = combine([
            spec.overrides.for_backend(Backend::SingleHost),
            spec.overrides.for_machine(&machine.key),
        ]);

        let restart = match overrides.remove("restart") {
            None => DEFAULT_RESTART.to_string(),
            Some(Value::String(policy)) if RESTART_POLICIES.contains(&policy.as_str()) => policy,
            Some(other) => {
                return Err(Error::render(
                    service.key,
                    format!(
                        "restart override {} is not one of {}",
                        other,
                        RESTART_POLICIES.join(", ")
                    ),
                ));
            }
        };

        let mut volumes = BTreeMap::new();
        let mut mounts = Vec::new();
        if let Some(mount) = mount_for(config, service) {
            mounts.push(mount.mount);
            volumes.extend(mount.definition);
        }

        let mut secrets = BTreeMap::new();
        for name in &spec.secrets {
            let file = config
                .secrets
                .get(name)
                .and_then(|s| s.file.as_deref())
                .ok_or_else(|| {
                    Error::render(
                        service.key,
                        format!(
                            "secret '{}' has no file; the single-host backend cannot use pre-existing secrets",
                            name
                        ),
                    )
                })?;
            secrets.insert(name.clone(), json!({ "file": file }));
        }

        let entry = ComposeService {
            image: &spec.image,
            container_name: service.key,
            restart,
            ports: spec.ports.iter().map(|p| format!("{}:{}", p, p)).collect(),
            environment: &spec.environment,
            volumes: mounts,
            secrets: spec.secrets.iter().map(String::as_str).collect(),
            networks: vec![config.network.as_str()],
        };

        let mut body = serde_json::to_value(&entry)
            .map_err(|e| Error::render(service.key, e.to_string()))?;
        deep_merge(&mut body, &Value::Object(overrides));

        Ok(BackendServiceDescriptor {
            name: service.key.to_string(),
            placement: Placement::Machine(machine.key.clone()),
            service: body,
            volumes,
            secrets,
        })
    }
}

impl Translator for SingleHostTranslator {
    fn backend(&self) -> Backend {
        Backend::SingleHost
    }

    fn translate(
        &self,
        config: &UnifiedConfig,
        service: ServiceRef<'_>,
        machines: &[&Machine],
    ) -> Result<Vec<BackendServiceDescriptor>> {
        machines
            .iter()
            .map(|machine| self.descriptor(config, service, machine))
            .collect()
    }
}
