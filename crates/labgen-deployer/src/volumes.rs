//! Storage to volume mapping shared by both translators.

use labgen_core::{ServiceRef, Storage, UnifiedConfig};
use serde_json::{Value, json};

/// Size label attached to volumes declared with `sized:`.
pub const SIZE_LABEL: &str = "labgen.size";

/// Volume entry of a service and the top-level volume it needs, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMount {
    pub mount: String,
    pub definition: Option<(String, Value)>,
}

pub fn volume_name(service: &str) -> String {
    format!("{}-data", service)
}

/// Map a service's storage onto a volume mount.
pub fn mount_for(config: &UnifiedConfig, service: ServiceRef<'_>) -> Option<VolumeMount> {
    let target = &service.spec.mount;
    match &service.spec.storage {
        Storage::None => None,
        Storage::Persistent => {
            let name = volume_name(service.key);
            let device = format!("{}/{}", config.data_root.trim_end_matches('/'), service.key);
            Some(VolumeMount {
                mount: format!("{}:{}", name, target),
                definition: Some((
                    name,
                    json!({
                        "driver": "local",
                        "driver_opts": {
                            "type": "none",
                            "o": "bind",
                            "device": device,
                        }
                    }),
                )),
            })
        }
        Storage::Ephemeral => Some(VolumeMount {
            mount: format!(
                "{}/{}:{}",
                config.scratch_root.trim_end_matches('/'),
                service.key,
                target
            ),
            definition: None,
        }),
        Storage::Sized(quantity) => {
            let name = volume_name(service.key);
            Some(VolumeMount {
                mount: format!("{}:{}", name, target),
                definition: Some((name, json!({ "labels": { SIZE_LABEL: quantity.to_string() } }))),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labgen_core::{Backend, Quantity, ServiceSpec, SizeUnit};

    fn config() -> UnifiedConfig {
        let mut config = UnifiedConfig::new("1", Backend::SingleHost);
        config.data_root = "/srv/lab/".to_string();
        config.scratch_root = "/scratch".to_string();
        config
    }

    #[test]
    fn test_persistent_binds_under_data_root() {
        let mut spec = ServiceSpec::new("postgres:16");
        spec.storage = Storage::Persistent;
        spec.mount = "/var/lib/postgresql/data".to_string();
        let mount = mount_for(&config(), ServiceRef::new("db", &spec)).unwrap();
        assert_eq!(mount.mount, "db-data:/var/lib/postgresql/data");
        let (name, def) = mount.definition.unwrap();
        assert_eq!(name, "db-data");
        assert_eq!(def["driver_opts"]["device"], "/srv/lab/db");
    }

    #[test]
    fn test_ephemeral_is_bind_mount() {
        let mut spec = ServiceSpec::new("app");
        spec.storage = Storage::Ephemeral;
        let mount = mount_for(&config(), ServiceRef::new("cache", &spec)).unwrap();
        assert_eq!(mount.mount, "/scratch/cache:/data");
        assert!(mount.definition.is_none());
    }

    #[test]
    fn test_sized_is_labelled() {
        let mut spec = ServiceSpec::new("app");
        spec.storage = Storage::Sized(Quantity {
            value: 5,
            unit: SizeUnit::G,
        });
        let mount = mount_for(&config(), ServiceRef::new("media", &spec)).unwrap();
        let (_, def) = mount.definition.unwrap();
        assert_eq!(def["labels"][SIZE_LABEL], "5G");
    }

    #[test]
    fn test_no_storage() {
        let spec = ServiceSpec::new("app");
        assert!(mount_for(&config(), ServiceRef::new("web", &spec)).is_none());
    }
}
