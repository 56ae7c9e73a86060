//! Deploy strategies: which machines a service targets.

use crate::MachineKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-service rule selecting its target machine(s).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "machine")]
pub enum DeployStrategy {
    /// The default machine. Also used when no strategy is given.
    #[default]
    Driver,
    /// Every declared machine.
    All,
    /// Exactly the named machine.
    Specific(MachineKey),
    /// One machine picked by hashing the service key.
    Random,
    /// Resolves exactly like [`DeployStrategy::Random`].
    Any,
}

impl DeployStrategy {
    /// The machine this strategy names explicitly, if any.
    pub fn named_machine(&self) -> Option<&MachineKey> {
        match self {
            DeployStrategy::Specific(key) => Some(key),
            _ => None,
        }
    }
}

impl FromStr for DeployStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driver" => Ok(DeployStrategy::Driver),
            "all" => Ok(DeployStrategy::All),
            "random" => Ok(DeployStrategy::Random),
            "any" => Ok(DeployStrategy::Any),
            other => match other.strip_prefix("specific:") {
                Some("") => Err("specific: requires a machine key".to_string()),
                Some(key) => Ok(DeployStrategy::Specific(MachineKey::from(key))),
                None => Err(format!(
                    "unknown deploy strategy '{}', expected driver, all, specific:<machine>, random or any",
                    other
                )),
            },
        }
    }
}

impl fmt::Display for DeployStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStrategy::Driver => write!(f, "driver"),
            DeployStrategy::All => write!(f, "all"),
            DeployStrategy::Specific(key) => write!(f, "specific:{}", key),
            DeployStrategy::Random => write!(f, "random"),
            DeployStrategy::Any => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategies() {
        assert_eq!("driver".parse::<DeployStrategy>().unwrap(), DeployStrategy::Driver);
        assert_eq!("all".parse::<DeployStrategy>().unwrap(), DeployStrategy::All);
        assert_eq!(
            "specific:node-01".parse::<DeployStrategy>().unwrap(),
            DeployStrategy::Specific(MachineKey::from("node-01"))
        );
        assert_eq!("any".parse::<DeployStrategy>().unwrap(), DeployStrategy::Any);
    }

    #[test]
    fn test_rejects_unknown() {
        assert!("everywhere".parse::<DeployStrategy>().is_err());
        assert!("specific:".parse::<DeployStrategy>().is_err());
    }

    #[test]
    fn test_display_round_trips_specific() {
        let s = DeployStrategy::Specific(MachineKey::from("nas"));
        assert_eq!(s.to_string(), "specific:nas");
    }
}
