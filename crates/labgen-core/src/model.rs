//! The unified configuration model.
//!
//! A [`UnifiedConfig`] is built by `labgen-config` from the configuration
//! document and is never mutated afterwards. Every mapping that ends up in
//! generated output is a `BTreeMap`, so iteration is sorted by key.

use crate::storage::Storage;
use crate::strategy::DeployStrategy;
use crate::MachineKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Default project name, used for the compose project and the stack name.
pub const DEFAULT_PROJECT: &str = "homelab";
/// Base domain used when neither the document nor `BASE_DOMAIN` sets one.
pub const DEFAULT_BASE_DOMAIN: &str = "home.arpa";
pub const DEFAULT_DATA_ROOT: &str = "/srv/homelab";
pub const DEFAULT_SCRATCH_ROOT: &str = "/tmp/homelab";
pub const DEFAULT_NETWORK: &str = "homelab";
/// Container path storage is mounted at unless the service says otherwise.
pub const DEFAULT_MOUNT: &str = "/data";

/// Target orchestrator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// One orchestrator per machine (docker compose).
    SingleHost,
    /// One orchestrator spanning every machine (docker swarm).
    Cluster,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::SingleHost => "single_host",
            Backend::Cluster => "cluster",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_host" => Ok(Backend::SingleHost),
            "cluster" => Ok(Backend::Cluster),
            other => Err(other.to_string()),
        }
    }
}

/// Role of a machine in a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineRole {
    Manager,
    Worker,
}

impl FromStr for MachineRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(MachineRole::Manager),
            "worker" => Ok(MachineRole::Worker),
            other => Err(format!("unknown role '{}', expected manager or worker", other)),
        }
    }
}

/// A machine services can be deployed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub key: MachineKey,
    /// Hostname or IP address used to reach the machine.
    pub host: String,
    pub ssh_user: Option<String>,
    /// Node name the cluster scheduler knows the machine by, when `host`
    /// is an address.
    pub hostname: Option<String>,
    pub role: MachineRole,
    pub labels: BTreeSet<String>,
    /// Whether this is the driver machine.
    pub default: bool,
}

impl Machine {
    /// Name used in `node.hostname` placement constraints.
    pub fn node_hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.host)
    }
}

/// Environment-style key of a service in the hostname mapping: upper case,
/// `-` and `.` become `_`.
pub fn mapping_key(service: &str) -> String {
    service
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// How a service is exposed under the base domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Domain {
    /// Use the service key.
    #[default]
    ServiceKey,
    Custom(String),
    /// Not exposed through the reverse proxy or the hostname mapping.
    Disabled,
}

impl Domain {
    /// Leftmost part of the public hostname, or `None` when not exposed.
    pub fn label<'a>(&'a self, service_key: &'a str) -> Option<&'a str> {
        match self {
            Domain::ServiceKey => Some(service_key),
            Domain::Custom(name) => Some(name),
            Domain::Disabled => None,
        }
    }
}

/// Free-form override trees, merged last with override-wins semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overrides {
    pub backend: BTreeMap<Backend, serde_json::Map<String, serde_json::Value>>,
    /// Applied after the backend scope; single-host only.
    pub machine: BTreeMap<MachineKey, serde_json::Map<String, serde_json::Value>>,
}

impl Overrides {
    pub fn for_backend(&self, backend: Backend) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.backend.get(&backend)
    }

    pub fn for_machine(&self, key: &MachineKey) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.machine.get(key)
    }
}

/// A logical service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub image: String,
    pub ports: Vec<u16>,
    pub environment: BTreeMap<String, String>,
    pub storage: Storage,
    /// Container path the storage is mounted at.
    pub mount: String,
    pub deploy: DeployStrategy,
    pub enabled: bool,
    pub domain: Domain,
    /// Names of top-level secrets this service uses.
    pub secrets: BTreeSet<String>,
    pub overrides: Overrides,
}

impl ServiceSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ports: Vec::new(),
            environment: BTreeMap::new(),
            storage: Storage::None,
            mount: DEFAULT_MOUNT.to_string(),
            deploy: DeployStrategy::Driver,
            enabled: true,
            domain: Domain::ServiceKey,
            secrets: BTreeSet::new(),
            overrides: Overrides::default(),
        }
    }

    /// Port the reverse proxy forwards to.
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.first().copied()
    }
}

/// A top-level secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSpec {
    /// Local file holding the value. Without one the secret must already
    /// exist in the orchestrator.
    pub file: Option<String>,
}

/// Root of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedConfig {
    pub version: String,
    pub backend: Backend,
    pub project: String,
    pub base_domain: String,
    pub data_root: String,
    pub scratch_root: String,
    pub network: String,
    pub environment: BTreeMap<String, String>,
    /// In declaration order.
    pub machines: Vec<Machine>,
    pub services: BTreeMap<String, ServiceSpec>,
    pub secrets: BTreeMap<String, SecretSpec>,
}

impl UnifiedConfig {
    /// Configuration with defaults for every optional setting.
    pub fn new(version: impl Into<String>, backend: Backend) -> Self {
        Self {
            version: version.into(),
            backend,
            project: DEFAULT_PROJECT.to_string(),
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            data_root: DEFAULT_DATA_ROOT.to_string(),
            scratch_root: DEFAULT_SCRATCH_ROOT.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            environment: BTreeMap::new(),
            machines: Vec::new(),
            services: BTreeMap::new(),
            secrets: BTreeMap::new(),
        }
    }

    pub fn machine(&self, key: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.key.as_str() == key)
    }

    /// The driver machine: the flagged one, else the first declared.
    pub fn default_machine(&self) -> Option<&Machine> {
        self.machines
            .iter()
            .find(|m| m.default)
            .or_else(|| self.machines.first())
    }

    pub fn enabled_services(&self) -> impl Iterator<Item = (&str, &ServiceSpec)> {
        self.services
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(k, s)| (k.as_str(), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(key: &str, default: bool) -> Machine {
        Machine {
            key: MachineKey::from(key),
            host: format!("{}.lan", key),
            ssh_user: None,
            hostname: None,
            role: MachineRole::Worker,
            labels: BTreeSet::new(),
            default,
        }
    }

    #[test]
    fn test_default_machine_prefers_flag() {
        let mut config = UnifiedConfig::new("1", Backend::SingleHost);
        config.machines = vec![machine("a", false), machine("b", true)];
        assert_eq!(config.default_machine().unwrap().key.as_str(), "b");
    }

    #[test]
    fn test_default_machine_falls_back_to_first() {
        let mut config = UnifiedConfig::new("1", Backend::SingleHost);
        config.machines = vec![machine("a", false), machine("b", false)];
        assert_eq!(config.default_machine().unwrap().key.as_str(), "a");
    }

    #[test]
    fn test_domain_label() {
        assert_eq!(Domain::ServiceKey.label("web"), Some("web"));
        assert_eq!(Domain::Custom("www".into()).label("web"), Some("www"));
        assert_eq!(Domain::Disabled.label("web"), None);
    }

    #[test]
    fn test_node_hostname_prefers_hostname() {
        let mut m = machine("a", false);
        assert_eq!(m.node_hostname(), "a.lan");
        m.host = "10.0.0.1".to_string();
        m.hostname = Some("pi-a".to_string());
        assert_eq!(m.node_hostname(), "pi-a");
    }

    #[test]
    fn test_mapping_key() {
        assert_eq!(mapping_key("home-assistant"), "HOME_ASSISTANT");
        assert_eq!(mapping_key("a.b"), "A_B");
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("cluster".parse::<Backend>().unwrap(), Backend::Cluster);
        assert!("kubernetes".parse::<Backend>().is_err());
    }
}
