//! Machine assignment: the concrete machines each service targets.

use crate::model::{Machine, UnifiedConfig};
use crate::strategy::DeployStrategy;
use crate::MachineKey;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Mapping from service key to its target machines.
///
/// Built fresh on every run and never mutated afterwards. Machine lists keep
/// declaration order for `all` and hold a single key for every other strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedAssignment {
    services: BTreeMap<String, Vec<MachineKey>>,
}

impl ResolvedAssignment {
    /// Resolve every declared service, enabled or not.
    ///
    /// Never fails on a validated configuration. A `specific:` strategy naming
    /// an unknown machine resolves to no machines.
    pub fn resolve(config: &UnifiedConfig) -> Self {
        let services = config
            .services
            .iter()
            .map(|(key, spec)| (key.clone(), targets(config, key, &spec.deploy)))
            .collect();
        Self { services }
    }

    /// Target machines of a service, empty for unknown services.
    pub fn machines(&self, service: &str) -> &[MachineKey] {
        self.services.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `service` runs on `machine`, by exact key equality.
    pub fn targets(&self, service: &str, machine: &MachineKey) -> bool {
        self.machines(service).contains(machine)
    }

    /// Services assigned to a machine, sorted by key.
    pub fn services_on<'a>(&'a self, machine: &'a MachineKey) -> impl Iterator<Item = &'a str> + 'a {
        self.services
            .iter()
            .filter(move |(_, machines)| machines.contains(machine))
            .map(|(service, _)| service.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MachineKey])> {
        self.services.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

fn targets(config: &UnifiedConfig, service: &str, strategy: &DeployStrategy) -> Vec<MachineKey> {
    match strategy {
        DeployStrategy::Driver => config
            .default_machine()
            .map(|m| vec![m.key.clone()])
            .unwrap_or_default(),
        DeployStrategy::All => config.machines.iter().map(|m| m.key.clone()).collect(),
        DeployStrategy::Specific(key) => config
            .machine(key.as_str())
            .map(|m| vec![m.key.clone()])
            .unwrap_or_default(),
        DeployStrategy::Random | DeployStrategy::Any => hashed_pick(&config.machines, service)
            .map(|m| vec![m.key.clone()])
            .unwrap_or_default(),
    }
}

/// Pick one machine from the key-sorted machine list by hashing the service
/// key. Stable across runs, processes and toolchain versions.
pub fn hashed_pick<'a>(machines: &'a [Machine], service: &str) -> Option<&'a Machine> {
    if machines.is_empty() {
        return None;
    }

    let mut sorted: Vec<&Machine> = machines.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let digest = Sha256::digest(service.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(head) % sorted.len() as u64;

    Some(sorted[index as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Backend, MachineRole, ServiceSpec};
    use std::collections::BTreeSet;

    fn machine(key: &str) -> Machine {
        Machine {
            key: MachineKey::from(key),
            host: format!("10.0.0.{}", key.len()),
            ssh_user: None,
            hostname: None,
            role: MachineRole::Worker,
            labels: BTreeSet::new(),
            default: false,
        }
    }

    fn config(machines: &[&str], services: &[(&str, DeployStrategy)]) -> UnifiedConfig {
        let mut config = UnifiedConfig::new("1", Backend::SingleHost);
        config.machines = machines.iter().map(|k| machine(k)).collect();
        for (key, strategy) in services {
            let mut spec = ServiceSpec::new("alpine");
            spec.deploy = strategy.clone();
            config.services.insert(key.to_string(), spec);
        }
        config
    }

    fn keys(list: &[MachineKey]) -> Vec<&str> {
        list.iter().map(|k| k.as_str()).collect()
    }

    #[test]
    fn test_driver_targets_default_machine() {
        let mut cfg = config(&["driver", "node-01"], &[("web", DeployStrategy::Driver)]);
        cfg.machines[1].default = true;
        let resolved = ResolvedAssignment::resolve(&cfg);
        assert_eq!(keys(resolved.machines("web")), vec!["node-01"]);
    }

    #[test]
    fn test_all_keeps_declaration_order() {
        let cfg = config(&["zeta", "alpha", "mid"], &[("proxy", DeployStrategy::All)]);
        let resolved = ResolvedAssignment::resolve(&cfg);
        assert_eq!(keys(resolved.machines("proxy")), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_specific_uses_exact_membership() {
        let cfg = config(
            &["node-1", "node-10"],
            &[("app", DeployStrategy::Specific(MachineKey::from("node-10")))],
        );
        let resolved = ResolvedAssignment::resolve(&cfg);
        assert!(resolved.targets("app", &MachineKey::from("node-10")));
        assert!(!resolved.targets("app", &MachineKey::from("node-1")));
        assert_eq!(resolved.services_on(&MachineKey::from("node-1")).count(), 0);
    }

    #[test]
    fn test_random_and_any_agree_and_are_stable() {
        let cfg = config(
            &["c", "a", "b", "d"],
            &[("svc", DeployStrategy::Random), ("other", DeployStrategy::Any)],
        );
        let first = ResolvedAssignment::resolve(&cfg);
        let second = ResolvedAssignment::resolve(&cfg);
        assert_eq!(first, second);
        assert_eq!(first.machines("svc").len(), 1);

        let random = hashed_pick(&cfg.machines, "other").unwrap();
        assert_eq!(first.machines("other"), &[random.key.clone()]);
    }

    #[test]
    fn test_random_ignores_declaration_order() {
        let forward = config(&["a", "b", "c"], &[("svc", DeployStrategy::Random)]);
        let reverse = config(&["c", "b", "a"], &[("svc", DeployStrategy::Random)]);
        assert_eq!(
            ResolvedAssignment::resolve(&forward).machines("svc"),
            ResolvedAssignment::resolve(&reverse).machines("svc")
        );
    }

    #[test]
    fn test_unknown_service_has_no_machines() {
        let cfg = config(&["a"], &[]);
        assert!(ResolvedAssignment::resolve(&cfg).machines("ghost").is_empty());
    }
}
