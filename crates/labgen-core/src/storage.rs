//! Service storage declarations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage requested by a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "size")]
pub enum Storage {
    #[default]
    None,
    /// Survives container recreation, kept under the data root.
    Persistent,
    /// Scratch space, may be wiped by the host at any time.
    Ephemeral,
    /// Named volume with a size hint. The hint is never enforced here.
    Sized(Quantity),
}

impl FromStr for Storage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Storage::None),
            "persistent" => Ok(Storage::Persistent),
            "ephemeral" => Ok(Storage::Ephemeral),
            other => match other.strip_prefix("sized:") {
                Some(qty) => qty.parse().map(Storage::Sized),
                None => Err(format!(
                    "unknown storage '{}', expected none, persistent, ephemeral or sized:<quantity>",
                    other
                )),
            },
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::None => write!(f, "none"),
            Storage::Persistent => write!(f, "persistent"),
            Storage::Ephemeral => write!(f, "ephemeral"),
            Storage::Sized(q) => write!(f, "sized:{}", q),
        }
    }
}

/// Unit suffix of a [`Quantity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    K,
    M,
    G,
    T,
    Ki,
    Mi,
    Gi,
    Ti,
    KB,
    MB,
    GB,
    TB,
}

impl SizeUnit {
    const ALL: [SizeUnit; 12] = [
        SizeUnit::Ki,
        SizeUnit::Mi,
        SizeUnit::Gi,
        SizeUnit::Ti,
        SizeUnit::KB,
        SizeUnit::MB,
        SizeUnit::GB,
        SizeUnit::TB,
        SizeUnit::K,
        SizeUnit::M,
        SizeUnit::G,
        SizeUnit::T,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            SizeUnit::K => "K",
            SizeUnit::M => "M",
            SizeUnit::G => "G",
            SizeUnit::T => "T",
            SizeUnit::Ki => "Ki",
            SizeUnit::Mi => "Mi",
            SizeUnit::Gi => "Gi",
            SizeUnit::Ti => "Ti",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
            SizeUnit::GB => "GB",
            SizeUnit::TB => "TB",
        }
    }
}

/// A positive size such as `10Gi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: u64,
    pub unit: SizeUnit,
}

impl FromStr for Quantity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Two-letter suffixes come first in ALL so "Gi" is not read as "G" + "i".
        let unit = SizeUnit::ALL
            .iter()
            .copied()
            .find(|u| s.ends_with(u.suffix()))
            .ok_or_else(|| format!("quantity '{}' has no recognized unit", s))?;

        let digits = &s[..s.len() - unit.suffix().len()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("quantity '{}' does not start with a whole number", s));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("quantity '{}' does not start with a whole number", s))?;
        if value == 0 {
            return Err(format!("quantity '{}' must be positive", s));
        }

        Ok(Quantity { value, unit })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_storage_tags() {
        assert_eq!("none".parse::<Storage>().unwrap(), Storage::None);
        assert_eq!("persistent".parse::<Storage>().unwrap(), Storage::Persistent);
        assert_eq!("ephemeral".parse::<Storage>().unwrap(), Storage::Ephemeral);
    }

    #[test]
    fn test_parse_sized() {
        let storage: Storage = "sized:10Gi".parse().unwrap();
        assert_eq!(
            storage,
            Storage::Sized(Quantity {
                value: 10,
                unit: SizeUnit::Gi
            })
        );
        assert_eq!(storage.to_string(), "sized:10Gi");
    }

    #[test]
    fn test_single_letter_unit() {
        let q: Quantity = "512M".parse().unwrap();
        assert_eq!(q.unit, SizeUnit::M);
        assert_eq!(q.value, 512);
    }

    #[test]
    fn test_rejects_bad_quantities() {
        assert!("0Gi".parse::<Quantity>().is_err());
        assert!("-5G".parse::<Quantity>().is_err());
        assert!("10".parse::<Quantity>().is_err());
        assert!("10XB".parse::<Quantity>().is_err());
        assert!("Gi".parse::<Quantity>().is_err());
        assert!("sized:".parse::<Storage>().is_err());
        assert!("tmpfs".parse::<Storage>().is_err());
    }

    #[test]
    fn test_quantity_is_digits_only() {
        assert!("+5G".parse::<Quantity>().is_err());
        assert!("sized:+5G".parse::<Storage>().is_err());
        assert!(" 5G".parse::<Quantity>().is_err());
        assert!("1_000M".parse::<Quantity>().is_err());
    }
}
