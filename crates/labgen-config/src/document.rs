//! Unified configuration parsing and validation.
//!
//! Validation never stops at the first problem: every node is checked and
//! all errors are returned together. A configuration is only handed out when
//! the error list is empty.

use crate::error::{ConfigError, ValidationErrors, ValidationWarning};
use crate::nodes::{
    all_string_args, args, child, children_named, document_to_json, field, first_arg,
    first_string_arg, is_null, prop, scalar_string, string_pairs, type_name,
};
use crate::variables::VariableContext;
use kdl::{KdlDocument, KdlNode};
use labgen_core::model::{
    DEFAULT_BASE_DOMAIN, DEFAULT_DATA_ROOT, DEFAULT_MOUNT, DEFAULT_NETWORK, DEFAULT_PROJECT,
    DEFAULT_SCRATCH_ROOT,
};
use labgen_core::{
    Backend, DeployStrategy, Domain, Machine, MachineKey, MachineRole, SecretSpec, ServiceSpec,
    Storage, UnifiedConfig, mapping_key,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};

/// A configuration that passed validation.
#[derive(Debug, Clone)]
pub struct Validated {
    pub config: UnifiedConfig,
    pub warnings: Vec<ValidationWarning>,
}

/// Parse and validate a configuration document with no known location.
///
/// Secret files must then be absolute paths.
pub fn validate(raw: &str) -> Result<Validated, ValidationErrors> {
    let doc: KdlDocument = raw.parse().map_err(ConfigError::from)?;
    Validator::default().run(&doc)
}

/// Parse and validate a document that lives in `base_dir`. Relative secret
/// files are resolved against it.
pub fn validate_at(raw: &str, base_dir: impl Into<PathBuf>) -> Result<Validated, ValidationErrors> {
    let doc: KdlDocument = raw.parse().map_err(ConfigError::from)?;
    Validator {
        base_dir: Some(base_dir.into()),
        ..Validator::default()
    }
    .run(&doc)
}

/// Absolute directory containing a configuration document.
pub fn document_dir(path: &Path) -> std::io::Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::path::absolute(parent)
}

/// Read a configuration document from disk, then validate it relative to
/// its directory.
pub fn validate_file(path: impl AsRef<Path>) -> Result<Validated, ValidationErrors> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(ConfigError::from)?;
    let base_dir = document_dir(path).map_err(ConfigError::from)?;
    validate_at(&raw, base_dir)
}

const TOP_LEVEL: &[&str] = &[
    "version",
    "backend",
    "name",
    "base-domain",
    "data-root",
    "scratch-root",
    "network",
    "environment",
    "machines",
    "services",
    "secrets",
];

#[derive(Default)]
struct Validator {
    errors: Vec<ConfigError>,
    warnings: Vec<ValidationWarning>,
    /// Directory of the document, if known.
    base_dir: Option<PathBuf>,
}

impl Validator {
    fn error(&mut self, error: ConfigError) {
        self.errors.push(error);
    }

    fn warn(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            field: field.into(),
            message: message.into(),
        });
    }

    fn run(mut self, doc: &KdlDocument) -> Result<Validated, ValidationErrors> {
        let mut top: BTreeMap<&str, &KdlNode> = BTreeMap::new();
        for node in doc.nodes() {
            let name = node.name().value();
            if !TOP_LEVEL.contains(&name) {
                self.warn(name, "unknown top-level node is ignored");
                continue;
            }
            if top.insert(name, node).is_some() {
                self.error(ConfigError::Duplicate(format!("top-level node '{}'", name)));
            }
        }

        let version = match top.get("version").map(|n| first_arg(n)) {
            None | Some(None) => {
                self.error(ConfigError::MissingField("version".to_string()));
                String::new()
            }
            Some(Some(value)) => match scalar_string(value) {
                Some(v) if !v.trim().is_empty() => v,
                Some(_) => {
                    self.error(ConfigError::invalid("version", "must not be empty"));
                    String::new()
                }
                None => {
                    self.error(ConfigError::invalid(
                        "version",
                        format!("expected a string or integer, found {}", type_name(value)),
                    ));
                    String::new()
                }
            },
        };

        let backend = match top.get("backend").and_then(|n| first_string_arg(n)) {
            Some(value) => match value.parse::<Backend>() {
                Ok(backend) => Some(backend),
                Err(unknown) => {
                    self.error(ConfigError::UnsupportedBackend(unknown));
                    None
                }
            },
            None => {
                self.error(ConfigError::MissingField("backend".to_string()));
                None
            }
        };

        let mut config = UnifiedConfig::new(version, backend.unwrap_or(Backend::SingleHost));

        if let Some(node) = top.get("environment") {
            config.environment = self.string_map(node, "environment");
        }

        config.project = self
            .setting(&top, "name")
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string());
        if !is_dns_label(&config.project) {
            self.error(ConfigError::invalid(
                "name",
                format!("'{}' is not a valid project name", config.project),
            ));
        }

        config.base_domain = self
            .setting(&top, "base-domain")
            .or_else(|| config.environment.get("BASE_DOMAIN").cloned())
            .unwrap_or_else(|| DEFAULT_BASE_DOMAIN.to_string());
        if !is_dns_name(&config.base_domain) {
            self.error(ConfigError::invalid(
                "base-domain",
                format!("'{}' is not a valid domain", config.base_domain),
            ));
        }

        config.data_root = self
            .setting(&top, "data-root")
            .unwrap_or_else(|| DEFAULT_DATA_ROOT.to_string());
        config.scratch_root = self
            .setting(&top, "scratch-root")
            .unwrap_or_else(|| DEFAULT_SCRATCH_ROOT.to_string());
        for (field, path) in [("data-root", &config.data_root), ("scratch-root", &config.scratch_root)] {
            if !path.starts_with('/') {
                self.error(ConfigError::invalid(field, format!("'{}' must be an absolute path", path)));
            }
        }

        config.network = self
            .setting(&top, "network")
            .unwrap_or_else(|| DEFAULT_NETWORK.to_string());
        if !is_dns_label(&config.network) {
            self.error(ConfigError::invalid(
                "network",
                format!("'{}' is not a valid network name", config.network),
            ));
        }

        match top.get("machines") {
            Some(node) => config.machines = self.machines(node, backend),
            None => self.error(ConfigError::MissingField("machines".to_string())),
        }
        if top.contains_key("machines") && config.machines.is_empty() {
            self.error(ConfigError::MissingField(
                "machines (at least one machine is required)".to_string(),
            ));
        }

        if let Some(node) = top.get("secrets") {
            config.secrets = self.secrets(node);
        }

        match top.get("services") {
            Some(node) => config.services = self.services(node, &config),
            None => self.error(ConfigError::MissingField("services".to_string())),
        }

        if self.errors.is_empty() {
            Ok(Validated {
                config,
                warnings: self.warnings,
            })
        } else {
            Err(ValidationErrors::new(self.errors))
        }
    }

    fn setting(&mut self, top: &BTreeMap<&str, &KdlNode>, name: &str) -> Option<String> {
        let node = top.get(name)?;
        match first_string_arg(node) {
            Some(value) if !value.is_empty() => Some(value),
            _ => {
                self.error(ConfigError::invalid(name, "expected a non-empty string"));
                None
            }
        }
    }

    fn string_map(&mut self, node: &KdlNode, path: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (key, value) in string_pairs(node) {
            let field = format!("{}.{}", path, key);
            match value {
                Some(value) => {
                    if map.insert(key, value).is_some() {
                        self.error(ConfigError::Duplicate(field));
                    }
                }
                None => self.error(ConfigError::invalid(field, "expected a scalar value")),
            }
        }
        map
    }

    fn machines(&mut self, node: &KdlNode, backend: Option<Backend>) -> Vec<Machine> {
        let mut machines: Vec<Machine> = Vec::new();
        let Some(children) = node.children() else {
            return machines;
        };

        let mut seen = HashSet::new();
        let mut declared_roles = Vec::new();
        for child_node in children.nodes() {
            let key = child_node.name().value();
            let path = format!("machines.{}", key);

            if key.is_empty() || key.starts_with('.') || !is_service_key(key) {
                self.error(ConfigError::invalid(
                    &path,
                    "machine keys may only contain letters, digits, '-', '_' and '.', and must not start with '.'",
                ));
                continue;
            }
            if !seen.insert(key.to_string()) {
                self.error(ConfigError::Duplicate(format!("machine '{}'", key)));
                continue;
            }

            let host = match field(child_node, "host").and_then(scalar_string) {
                Some(host) if !host.is_empty() => host,
                _ => {
                    self.error(ConfigError::MissingField(format!("{}.host", path)));
                    String::new()
                }
            };

            let ssh_user = field(child_node, "user").and_then(scalar_string);

            let hostname = match field(child_node, "hostname") {
                None => None,
                Some(value) => match value.as_string() {
                    Some(name) if !name.is_empty() && name.parse::<IpAddr>().is_err() => {
                        Some(name.to_string())
                    }
                    _ => {
                        self.error(ConfigError::invalid(
                            format!("{}.hostname", path),
                            "expected a node name, not an address",
                        ));
                        None
                    }
                },
            };

            let role = match field(child_node, "role").and_then(scalar_string) {
                Some(role) => match role.parse::<MachineRole>() {
                    Ok(role) => Some(role),
                    Err(message) => {
                        self.error(ConfigError::invalid(format!("{}.role", path), message));
                        None
                    }
                },
                None => None,
            };

            let default = match field(child_node, "default") {
                Some(value) => match value.as_bool() {
                    Some(b) => b,
                    None => {
                        self.error(ConfigError::invalid(
                            format!("{}.default", path),
                            format!("expected a boolean, found {}", type_name(value)),
                        ));
                        false
                    }
                },
                None => false,
            };

            let labels: BTreeSet<String> = child(child_node, "labels")
                .map(all_string_args)
                .unwrap_or_default()
                .into_iter()
                .collect();

            declared_roles.push(role.is_some());
            machines.push(Machine {
                key: MachineKey::from(key),
                host,
                ssh_user,
                hostname,
                role: role.unwrap_or(MachineRole::Worker),
                labels,
                default,
            });
        }

        let flagged: Vec<&str> = machines
            .iter()
            .filter(|m| m.default)
            .map(|m| m.key.as_str())
            .collect();
        if flagged.len() > 1 {
            self.error(ConfigError::invalid(
                "machines",
                format!("only one machine may be the default, found {}", flagged.join(", ")),
            ));
        }
        if flagged.is_empty() {
            if let Some(first) = machines.first_mut() {
                first.default = true;
            }
        }

        // Without a declared role the default machine manages the cluster.
        for (machine, declared) in machines.iter_mut().zip(declared_roles) {
            if machine.default && !declared {
                machine.role = MachineRole::Manager;
            }
        }

        if backend == Some(Backend::Cluster)
            && !machines.is_empty()
            && !machines.iter().any(|m| m.role == MachineRole::Manager)
        {
            self.error(ConfigError::invalid(
                "machines",
                "the cluster backend needs at least one manager",
            ));
        }

        // Placement constraints match swarm node names, never addresses.
        if backend == Some(Backend::Cluster) {
            for machine in &machines {
                if machine.node_hostname().parse::<IpAddr>().is_ok() {
                    self.error(ConfigError::invalid(
                        format!("machines.{}.hostname", machine.key),
                        format!(
                            "host {} is an address; the cluster backend needs the node's hostname",
                            machine.host
                        ),
                    ));
                }
            }
        }

        machines
    }

    fn secrets(&mut self, node: &KdlNode) -> BTreeMap<String, SecretSpec> {
        let mut secrets = BTreeMap::new();
        let Some(children) = node.children() else {
            return secrets;
        };
        for secret in children.nodes() {
            let name = secret.name().value().to_string();
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                self.error(ConfigError::invalid(
                    format!("secrets.{}", name),
                    "secret names may only contain letters, digits, '-' and '_'",
                ));
            }
            let file = field(secret, "file")
                .and_then(scalar_string)
                .and_then(|file| self.secret_file(&name, file));
            let spec = SecretSpec { file };
            if secrets.insert(name.clone(), spec).is_some() {
                self.error(ConfigError::Duplicate(format!("secret '{}'", name)));
            }
        }
        secrets
    }

    /// Bundles are written away from the document, so a relative secret
    /// file is made absolute against the document directory.
    fn secret_file(&mut self, name: &str, file: String) -> Option<String> {
        let path = Path::new(&file);
        if path.is_absolute() {
            return Some(file);
        }
        match &self.base_dir {
            Some(base) => {
                let relative: PathBuf = path
                    .components()
                    .filter(|c| !matches!(c, Component::CurDir))
                    .collect();
                Some(base.join(relative).to_string_lossy().into_owned())
            }
            None => {
                self.error(ConfigError::invalid(
                    format!("secrets.{}.file", name),
                    format!(
                        "relative path '{}' needs the document's location; use an absolute path",
                        file
                    ),
                ));
                None
            }
        }
    }

    fn services(&mut self, node: &KdlNode, config: &UnifiedConfig) -> BTreeMap<String, ServiceSpec> {
        let mut services = BTreeMap::new();
        let Some(children) = node.children() else {
            return services;
        };

        let vars = VariableContext {
            env: config.environment.clone(),
            project: config.project.clone(),
            base_domain: config.base_domain.clone(),
            service: String::new(),
        };

        for service_node in children.nodes() {
            let key = service_node.name().value().to_string();
            if key.is_empty() {
                self.error(ConfigError::invalid("services", "service key must not be empty"));
                continue;
            }
            if services.contains_key(&key) {
                self.error(ConfigError::Duplicate(format!("service '{}'", key)));
                continue;
            }
            let spec = self.service(&key, service_node, config, &vars.for_service(&key));
            services.insert(key, spec);
        }
        self.exposure_collisions(&services);
        services
    }

    /// Enabled exposed services must differ in hostname and in mapping key.
    fn exposure_collisions(&mut self, services: &BTreeMap<String, ServiceSpec>) {
        let mut keys: HashMap<String, &str> = HashMap::new();
        let mut hostnames: HashMap<String, &str> = HashMap::new();
        for (service, spec) in services.iter().filter(|(_, s)| s.enabled) {
            let Some(label) = spec.domain.label(service) else {
                continue;
            };
            if let Some(other) = keys.insert(mapping_key(service), service) {
                self.error(ConfigError::Duplicate(format!(
                    "hostname key {} of services '{}' and '{}'",
                    mapping_key(service),
                    other,
                    service
                )));
            }
            if let Some(other) = hostnames.insert(label.to_ascii_lowercase(), service) {
                self.error(ConfigError::Duplicate(format!(
                    "domain '{}' of services '{}' and '{}'",
                    label.to_ascii_lowercase(),
                    other,
                    service
                )));
            }
        }
    }

    fn service(
        &mut self,
        key: &str,
        node: &KdlNode,
        config: &UnifiedConfig,
        vars: &VariableContext,
    ) -> ServiceSpec {
        let path = format!("services.{}", key);
        if !is_service_key(key) {
            self.error(ConfigError::invalid(
                &path,
                "service keys may only contain letters, digits, '-', '_' and '.'",
            ));
        }

        let image = match field(node, "image").and_then(scalar_string) {
            Some(image) if !image.trim().is_empty() => vars.interpolate(&image),
            _ => {
                self.error(ConfigError::MissingField(format!("{}.image", path)));
                String::new()
            }
        };
        for name in vars.unresolved(&image) {
            self.warn(format!("{}.image", path), format!("variable '{}' is not defined", name));
        }

        let mut spec = ServiceSpec::new(image);
        spec.ports = self.ports(node, &path);

        if let Some(env_node) = child(node, "environment") {
            let raw = self.string_map(env_node, &format!("{}.environment", path));
            for (name, value) in &raw {
                for missing in vars.unresolved(value) {
                    self.warn(
                        format!("{}.environment.{}", path, name),
                        format!("variable '{}' is not defined", missing),
                    );
                }
            }
            spec.environment = vars.interpolate_map(&raw);
        }

        if let Some(value) = field(node, "storage") {
            match scalar_string(value).map(|s| s.parse::<Storage>()) {
                Some(Ok(storage)) => spec.storage = storage,
                Some(Err(message)) => {
                    self.error(ConfigError::invalid(format!("{}.storage", path), message))
                }
                None => self.error(ConfigError::invalid(
                    format!("{}.storage", path),
                    format!("expected a string, found {}", type_name(value)),
                )),
            }
        }

        spec.mount = field(node, "mount")
            .and_then(scalar_string)
            .unwrap_or_else(|| DEFAULT_MOUNT.to_string());
        if !spec.mount.starts_with('/') {
            self.error(ConfigError::invalid(
                format!("{}.mount", path),
                format!("'{}' must be an absolute container path", spec.mount),
            ));
        }

        if let Some(value) = field(node, "deploy") {
            match scalar_string(value).map(|s| s.parse::<DeployStrategy>()) {
                Some(Ok(strategy)) => spec.deploy = strategy,
                Some(Err(message)) => {
                    self.error(ConfigError::invalid(format!("{}.deploy", path), message))
                }
                None => self.error(ConfigError::invalid(
                    format!("{}.deploy", path),
                    format!("expected a string, found {}", type_name(value)),
                )),
            }
        }
        if let Some(target) = spec.deploy.named_machine() {
            if config.machine(target.as_str()).is_none() {
                self.error(ConfigError::InvalidReference(format!(
                    "service '{}' is deployed to unknown machine '{}'",
                    key, target
                )));
            }
        }

        if let Some(value) = field(node, "enabled") {
            match value.as_bool() {
                Some(enabled) => spec.enabled = enabled,
                None => self.error(ConfigError::invalid(
                    format!("{}.enabled", path),
                    format!("expected a boolean, found {}", type_name(value)),
                )),
            }
        }

        spec.domain = match field(node, "domain") {
            None => Domain::ServiceKey,
            Some(value) if is_null(value) => Domain::Disabled,
            Some(value) => match value.as_string() {
                Some(name) if is_dns_name(name) => Domain::Custom(name.to_string()),
                _ => {
                    self.error(ConfigError::invalid(
                        format!("{}.domain", path),
                        "expected a domain name or #null",
                    ));
                    Domain::Disabled
                }
            },
        };
        if spec.domain == Domain::ServiceKey && !is_dns_label(&key.to_ascii_lowercase()) {
            self.error(ConfigError::invalid(
                format!("{}.domain", path),
                format!(
                    "service key '{}' is not a valid hostname, set an explicit domain or domain #null",
                    key
                ),
            ));
        }

        if let Some(secrets_node) = child(node, "secrets") {
            for name in all_string_args(secrets_node) {
                if !config.secrets.contains_key(&name) {
                    self.error(ConfigError::InvalidReference(format!(
                        "service '{}' uses undeclared secret '{}'",
                        key, name
                    )));
                }
                spec.secrets.insert(name);
            }
        }

        for override_node in children_named(node, "override") {
            self.override_block(key, override_node, config, &mut spec);
        }

        spec
    }

    fn ports(&mut self, node: &KdlNode, path: &str) -> Vec<u16> {
        let mut values = Vec::new();
        if let Some(port) = prop(node, "port") {
            values.push(port);
        }
        for name in ["port", "ports"] {
            for port_node in children_named(node, name) {
                values.extend(args(port_node));
            }
        }

        let mut ports = Vec::new();
        for value in values {
            let field = format!("{}.ports", path);
            match value.as_integer() {
                Some(n) if (1..=65535).contains(&n) => {
                    let port = n as u16;
                    if ports.contains(&port) {
                        self.error(ConfigError::Duplicate(format!("port {} in {}", port, path)));
                    } else {
                        ports.push(port);
                    }
                }
                Some(n) => self.error(ConfigError::invalid(
                    field,
                    format!("{} is outside 1-65535", n),
                )),
                None => self.error(ConfigError::invalid(
                    field,
                    format!("expected an integer, found {}", type_name(value)),
                )),
            }
        }
        ports
    }

    fn override_block(
        &mut self,
        key: &str,
        node: &KdlNode,
        config: &UnifiedConfig,
        spec: &mut ServiceSpec,
    ) {
        let field = format!("services.{}.override", key);
        let Some(scope) = first_string_arg(node) else {
            self.error(ConfigError::MissingField(format!("{} scope", field)));
            return;
        };
        let body = node.children().map(document_to_json).unwrap_or_default();

        if let Some(machine) = scope.strip_prefix("machine:") {
            if config.machine(machine).is_none() {
                self.error(ConfigError::InvalidReference(format!(
                    "override for service '{}' names unknown machine '{}'",
                    key, machine
                )));
                return;
            }
            if spec.overrides.machine.insert(MachineKey::from(machine), body).is_some() {
                self.error(ConfigError::Duplicate(format!("{} \"{}\"", field, scope)));
            }
            return;
        }

        match scope.parse::<Backend>() {
            Ok(backend) => {
                if spec.overrides.backend.insert(backend, body).is_some() {
                    self.error(ConfigError::Duplicate(format!("{} \"{}\"", field, scope)));
                }
            }
            Err(_) => self.error(ConfigError::invalid(
                field,
                format!(
                    "unknown scope '{}', expected single_host, cluster or machine:<key>",
                    scope
                ),
            )),
        }
    }
}

fn is_service_key(key: &str) -> bool {
    key.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_dns_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 253 && name.split('.').all(is_dns_label)
}
