//! Machine identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Key of a machine as declared in the `machines` block.
///
/// Matching is always by exact equality, never by substring: `node-1` and
/// `node-10` are unrelated keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct MachineKey(String);

impl MachineKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MachineKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for MachineKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl AsRef<str> for MachineKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for MachineKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_exact_membership() {
        let set: BTreeSet<MachineKey> = ["node-10", "driver"].into_iter().map(MachineKey::from).collect();
        assert!(set.contains("node-10"));
        assert!(!set.contains("node-1"));
    }

    #[test]
    fn test_orders_by_key() {
        let mut keys = vec![MachineKey::from("node-02"), MachineKey::from("driver")];
        keys.sort();
        assert_eq!(keys[0].as_str(), "driver");
    }
}
