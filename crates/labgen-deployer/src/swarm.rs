//! Cluster translator (docker swarm stacks).
//!
//! One descriptor per service no matter how many machines it targets:
//! `all` becomes global mode, every other strategy pins the service to the
//! one resolved machine with a placement constraint.

use crate::overrides::deep_merge;
use crate::volumes::mount_for;
use labgen_core::translator::{BackendServiceDescriptor, Placement, ServiceRef, Translator};
use labgen_core::{Backend, DeployStrategy, Error, Machine, Result, UnifiedConfig};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
struct StackService<'a> {
    image: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    secrets: Vec<&'a str>,
    networks: Vec<&'a str>,
    deploy: DeployConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<HealthCheck>,
}

#[derive(Debug, Serialize)]
struct DeployConfig {
    mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    replicas: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    placement: Option<PlacementConstraints>,
    restart_policy: RestartPolicy,
}

#[derive(Debug, Serialize)]
struct PlacementConstraints {
    constraints: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RestartPolicy {
    condition: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthCheck {
    test: Vec<String>,
    interval: &'static str,
    timeout: &'static str,
    retries: u32,
}

/// Translates services into swarm stack service entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClusterTranslator;

impl ClusterTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Translator for ClusterTranslator {
    fn backend(&self) -> Backend {
        Backend::Cluster
    }

    fn translate(
        &self,
        config: &UnifiedConfig,
        service: ServiceRef<'_>,
        machines: &[&Machine],
    ) -> Result<Vec<BackendServiceDescriptor>> {
        let spec = service.spec;
        let mut overrides = spec
            .overrides
            .for_backend(Backend::Cluster)
            .cloned()
            .unwrap_or_default();

        let replicas = match overrides.remove("replicas") {
            None => None,
            Some(value) => match value.as_u64() {
                Some(n) if n > 0 => Some(n),
                _ => {
                    return Err(Error::render(
                        service.key,
                        format!("replicas must be a positive integer, found {}", value),
                    ));
                }
            },
        };

        let health_path = match overrides.remove("health-check") {
            None => None,
            Some(Value::String(path)) if path.starts_with('/') => Some(path),
            Some(other) => {
                return Err(Error::render(
                    service.key,
                    format!("health-check must be a path starting with '/', found {}", other),
                ));
            }
        };

        let deploy = if spec.deploy == DeployStrategy::All {
            if replicas.is_some() {
                return Err(Error::render(
                    service.key,
                    "replicas conflicts with deploy \"all\", which runs one instance per node",
                ));
            }
            DeployConfig {
                mode: "global",
                replicas: None,
                placement: None,
                restart_policy: RestartPolicy { condition: "any" },
            }
        } else {
            let machine = match machines {
                [machine] => machine,
                [] => {
                    return Err(Error::render(service.key, "no target machine resolved"));
                }
                _ => {
                    return Err(Error::render(
                        service.key,
                        format!(
                            "deploy \"{}\" must resolve to one machine, got {}",
                            spec.deploy,
                            machines.len()
                        ),
                    ));
                }
            };
            DeployConfig {
                mode: "replicated",
                replicas: Some(replicas.unwrap_or(1)),
                placement: Some(PlacementConstraints {
                    constraints: vec![format!("node.hostname == {}", machine.node_hostname())],
                }),
                restart_policy: RestartPolicy { condition: "any" },
            }
        };

        let healthcheck = match (health_path, spec.primary_port()) {
            (None, _) => None,
            (Some(path), Some(port)) => Some(HealthCheck {
                test: vec![
                    "CMD".to_string(),
                    "curl".to_string(),
                    "-fsS".to_string(),
                    format!("http://localhost:{}{}", port, path),
                ],
                interval: "30s",
                timeout: "5s",
                retries: 3,
            }),
            (Some(_), None) => {
                return Err(Error::render(
                    service.key,
                    "health-check needs at least one port",
                ));
            }
        };

        let mut volumes = BTreeMap::new();
        let mut mounts = Vec::new();
        if let Some(mount) = mount_for(config, service) {
            mounts.push(mount.mount);
            volumes.extend(mount.definition);
        }

        let secrets = spec
            .secrets
            .iter()
            .map(|name| (name.clone(), json!({ "external": true })))
            .collect();

        let entry = StackService {
            image: &spec.image,
            ports: spec.ports.iter().map(|p| format!("{}:{}", p, p)).collect(),
            environment: &spec.environment,
            volumes: mounts,
            secrets: spec.secrets.iter().map(String::as_str).collect(),
            networks: vec![config.network.as_str()],
            deploy,
            healthcheck,
        };

        let mut body = serde_json::to_value(&entry)
            .map_err(|e| Error::render(service.key, e.to_string()))?;
        deep_merge(&mut body, &Value::Object(overrides));

        Ok(vec![BackendServiceDescriptor {
            name: service.key.to_string(),
            placement: Placement::Cluster,
            service: body,
            volumes,
            secrets,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labgen_core::{MachineKey, MachineRole, ServiceSpec};
    use std::collections::BTreeSet;

    fn machine(key: &str, host: &str) -> Machine {
        Machine {
            key: MachineKey::from(key),
            host: host.to_string(),
            ssh_user: None,
            hostname: None,
            role: MachineRole::Manager,
            labels: BTreeSet::new(),
            default: false,
        }
    }

    fn config() -> UnifiedConfig {
        let mut config = UnifiedConfig::new("1", Backend::Cluster);
        config.machines = vec![machine("driver", "pi-0"), machine("node-01", "pi-1")];
        config
    }

    fn translate(config: &UnifiedConfig, spec: &ServiceSpec, machines: &[&Machine]) -> Result<Value> {
        ClusterTranslator
            .translate(config, ServiceRef::new("app", spec), machines)
            .map(|mut d| d.remove(0).service)
    }

    #[test]
    fn test_all_becomes_global_mode() {
        let config = config();
        let mut spec = ServiceSpec::new("traefik:3");
        spec.deploy = DeployStrategy::All;
        let machines: Vec<&Machine> = config.machines.iter().collect();

        let descriptors = ClusterTranslator
            .translate(&config, ServiceRef::new("proxy", &spec), &machines)
            .unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].placement, Placement::Cluster);
        assert_eq!(descriptors[0].service["deploy"]["mode"], "global");
        assert!(descriptors[0].service["deploy"].get("placement").is_none());
    }

    #[test]
    fn test_specific_pins_to_hostname() {
        let config = config();
        let mut spec = ServiceSpec::new("app:1");
        spec.deploy = DeployStrategy::Specific(MachineKey::from("node-01"));
        let body = translate(&config, &spec, &[&config.machines[1]]).unwrap();
        assert_eq!(body["deploy"]["mode"], "replicated");
        assert_eq!(body["deploy"]["replicas"], 1);
        assert_eq!(
            body["deploy"]["placement"]["constraints"],
            json!(["node.hostname == pi-1"])
        );
    }

    #[test]
    fn test_random_is_pinned_not_left_to_scheduler() {
        let config = config();
        let mut spec = ServiceSpec::new("app:1");
        spec.deploy = DeployStrategy::Random;
        let body = translate(&config, &spec, &[&config.machines[0]]).unwrap();
        assert_eq!(
            body["deploy"]["placement"]["constraints"],
            json!(["node.hostname == pi-0"])
        );
    }

    #[test]
    fn test_addressed_machine_pins_to_node_name() {
        let mut config = config();
        config.machines[1].host = "10.0.0.11".to_string();
        config.machines[1].hostname = Some("pi-1".to_string());
        let mut spec = ServiceSpec::new("app:1");
        spec.deploy = DeployStrategy::Specific(MachineKey::from("node-01"));
        let body = translate(&config, &spec, &[&config.machines[1]]).unwrap();
        assert_eq!(
            body["deploy"]["placement"]["constraints"],
            json!(["node.hostname == pi-1"])
        );
    }

    #[test]
    fn test_replicas_and_health_check_pass_through() {
        let config = config();
        let mut spec = ServiceSpec::new("app:1");
        spec.ports = vec![8080];
        spec.overrides.backend.insert(
            Backend::Cluster,
            json!({ "replicas": 3, "health-check": "/healthz", "stop_grace_period": "30s" })
                .as_object()
                .cloned()
                .unwrap(),
        );
        let body = translate(&config, &spec, &[&config.machines[0]]).unwrap();
        assert_eq!(body["deploy"]["replicas"], 3);
        assert_eq!(body["healthcheck"]["test"][3], "http://localhost:8080/healthz");
        assert_eq!(body["stop_grace_period"], "30s");
        assert!(body.get("replicas").is_none());
    }

    #[test]
    fn test_replicas_with_global_mode_is_render_error() {
        let config = config();
        let mut spec = ServiceSpec::new("app:1");
        spec.deploy = DeployStrategy::All;
        spec.overrides.backend.insert(
            Backend::Cluster,
            json!({ "replicas": 2 }).as_object().cloned().unwrap(),
        );
        let machines: Vec<&Machine> = config.machines.iter().collect();
        assert!(matches!(
            translate(&config, &spec, &machines),
            Err(Error::Render { .. })
        ));
    }

    #[test]
    fn test_health_check_without_port_is_render_error() {
        let config = config();
        let mut spec = ServiceSpec::new("app:1");
        spec.overrides.backend.insert(
            Backend::Cluster,
            json!({ "health-check": "/up" }).as_object().cloned().unwrap(),
        );
        assert!(translate(&config, &spec, &[&config.machines[0]]).is_err());
    }

    #[test]
    fn test_secrets_are_external() {
        let config = config();
        let mut spec = ServiceSpec::new("app:1");
        spec.secrets.insert("api-key".to_string());
        let descriptor = ClusterTranslator
            .translate(&config, ServiceRef::new("app", &spec), &[&config.machines[0]])
            .unwrap()
            .remove(0);
        assert_eq!(descriptor.secrets["api-key"], json!({ "external": true }));
        assert_eq!(descriptor.service["secrets"], json!(["api-key"]));
    }
}
