//! Hostname mapping file (`hosts.env`).

use labgen_core::{Error, Result, mapping_key};
use std::collections::BTreeMap;
use std::fmt;

/// `<KEY>=<hostname>` lines, one per exposed service, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostnameMapping {
    entries: BTreeMap<String, String>,
}

impl HostnameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. Validation rejects colliding keys, so a collision
    /// here means the configuration bypassed it.
    pub fn insert(&mut self, service: &str, hostname: impl Into<String>) -> Result<()> {
        let key = mapping_key(service);
        if self.entries.contains_key(&key) {
            return Err(Error::Internal(format!(
                "hostname key {} of service '{}' is already used",
                key, service
            )));
        }
        self.entries.insert(key, hostname.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for HostnameMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, hostname) in &self.entries {
            writeln!(f, "{}={}", key, hostname)?;
        }
        Ok(())
    }
}
