//! Bundle assembly: every artifact for one target unit.

use crate::hosts::HostnameMapping;
use crate::proxy::{ProxyConfig, ProxyRenderer, hostname};
use crate::script::{DeployScript, descriptor_file};
use crate::{ClusterTranslator, SingleHostTranslator};
use labgen_core::translator::{BackendServiceDescriptor, ServiceRef, Translator};
use labgen_core::{Backend, Error, Machine, MachineKey, ResolvedAssignment, Result, UnifiedConfig};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;

pub const PROXY_FILE: &str = "proxy.conf";
pub const HOSTS_FILE: &str = "hosts.env";
pub const SCRIPT_FILE: &str = "deploy.sh";

/// Directory name of the cluster-wide unit.
pub const CLUSTER_UNIT: &str = "cluster";

/// Target unit of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "machine")]
pub enum Unit {
    Machine(MachineKey),
    Cluster,
}

impl Unit {
    /// Units of a configuration, in machine declaration order.
    pub fn all(config: &UnifiedConfig) -> Vec<Unit> {
        match config.backend {
            Backend::SingleHost => config
                .machines
                .iter()
                .map(|m| Unit::Machine(m.key.clone()))
                .collect(),
            Backend::Cluster => vec![Unit::Cluster],
        }
    }

    /// Output directory name.
    pub fn dir_name(&self) -> &str {
        match self {
            Unit::Machine(key) => key.as_str(),
            Unit::Cluster => CLUSTER_UNIT,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Machine(key) => write!(f, "machine {}", key),
            Unit::Cluster => write!(f, "cluster"),
        }
    }
}

/// One generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub name: String,
    pub contents: String,
    pub executable: bool,
}

impl BundleFile {
    fn new(name: impl Into<String>, contents: String) -> Self {
        Self {
            name: name.into(),
            contents,
            executable: false,
        }
    }
}

/// All artifacts of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub unit: Unit,
    /// Service keys in the descriptor, sorted.
    pub services: Vec<String>,
    pub files: Vec<BundleFile>,
}

impl Bundle {
    pub fn file(&self, name: &str) -> Option<&BundleFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Serialize)]
struct DescriptorDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    services: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    volumes: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    secrets: BTreeMap<String, Value>,
    networks: BTreeMap<String, Value>,
}

/// Translator for the configured backend.
pub fn translator_for(backend: Backend) -> Box<dyn Translator> {
    match backend {
        Backend::SingleHost => Box::new(SingleHostTranslator::new()),
        Backend::Cluster => Box::new(ClusterTranslator::new()),
    }
}

/// Build the bundle of one unit. Pure: nothing is written.
pub fn assemble(
    config: &UnifiedConfig,
    assignment: &ResolvedAssignment,
    unit: &Unit,
    translator: &dyn Translator,
) -> Result<Bundle> {
    if translator.backend() != config.backend {
        return Err(Error::Internal(format!(
            "{} translator used for a {} configuration",
            translator.backend(),
            config.backend
        )));
    }

    let local: Option<&Machine> = match unit {
        Unit::Machine(key) => Some(
            config
                .machine(key.as_str())
                .ok_or_else(|| Error::Internal(format!("unknown machine '{}'", key)))?,
        ),
        Unit::Cluster => None,
    };

    let mut descriptors: Vec<BackendServiceDescriptor> = Vec::new();
    let mut services = Vec::new();
    let mut proxy = ProxyConfig::default();
    let mut hosts = HostnameMapping::new();
    let renderer = ProxyRenderer::new(&config.base_domain);

    // enabled_services iterates a BTreeMap, so output is sorted by key.
    for (key, spec) in config.enabled_services() {
        let service = ServiceRef::new(key, spec);
        let machines: Vec<&Machine> = match local {
            Some(machine) if assignment.targets(key, &machine.key) => vec![machine],
            Some(_) => continue,
            None => assignment
                .machines(key)
                .iter()
                .filter_map(|k| config.machine(k.as_str()))
                .collect(),
        };

        descriptors.extend(translator.translate(config, service, &machines)?);
        services.push(key.to_string());

        if let Some(fragment) = renderer.render_service(service) {
            proxy.fragments.push(fragment);
        }
        if let Some(name) = hostname(service, &config.base_domain) {
            hosts.insert(key, name)?;
        }
    }

    let document = descriptor_document(config, descriptors);
    let descriptor = serde_yaml::to_string(&document)
        .map_err(|e| Error::Internal(format!("cannot serialize descriptor: {}", e)))?;

    let mut script = BundleFile::new(SCRIPT_FILE, DeployScript::for_config(config).to_string());
    script.executable = true;

    Ok(Bundle {
        unit: unit.clone(),
        services,
        files: vec![
            BundleFile::new(descriptor_file(config.backend), descriptor),
            BundleFile::new(PROXY_FILE, proxy.to_string()),
            BundleFile::new(HOSTS_FILE, hosts.to_string()),
            script,
        ],
    })
}

fn descriptor_document(
    config: &UnifiedConfig,
    descriptors: Vec<BackendServiceDescriptor>,
) -> DescriptorDocument {
    let mut services = Map::new();
    let mut volumes = BTreeMap::new();
    let mut secrets = BTreeMap::new();
    for descriptor in descriptors {
        services.insert(descriptor.name, descriptor.service);
        volumes.extend(descriptor.volumes);
        secrets.extend(descriptor.secrets);
    }

    let mut networks = BTreeMap::new();
    match config.backend {
        Backend::SingleHost => {
            networks.insert(config.network.clone(), json!({ "name": config.network }));
            DescriptorDocument {
                version: None,
                name: Some(config.project.clone()),
                services,
                volumes,
                secrets,
                networks,
            }
        }
        Backend::Cluster => {
            networks.insert(
                config.network.clone(),
                json!({ "driver": "overlay", "attachable": true }),
            );
            for name in config.secrets.keys() {
                secrets
                    .entry(name.clone())
                    .or_insert_with(|| json!({ "external": true }));
            }
            DescriptorDocument {
                version: Some("3.8"),
                name: None,
                services,
                volumes,
                secrets,
                networks,
            }
        }
    }
}

/// Assemble every unit of a configuration without writing anything.
pub fn build_bundles(config: &UnifiedConfig) -> Vec<(Unit, Result<Bundle>)> {
    let assignment = ResolvedAssignment::resolve(config);
    let translator = translator_for(config.backend);
    Unit::all(config)
        .into_iter()
        .map(|unit| {
            let bundle = assemble(config, &assignment, &unit, translator.as_ref());
            (unit, bundle)
        })
        .collect()
}
