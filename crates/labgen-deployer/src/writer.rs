//! Writing bundles to their output directories.

use crate::bundle::Bundle;
use async_trait::async_trait;
use labgen_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Destination for assembled bundles.
#[async_trait]
pub trait BundleWriter: Send + Sync {
    /// Write a bundle, returning the directory it now lives in.
    async fn write(&self, bundle: &Bundle) -> Result<PathBuf>;
}

/// Writes each bundle to `<root>/<unit>/`.
///
/// Files are staged in a sibling `.<unit>.staging` directory and swapped in
/// with a rename, so a unit directory always holds either the previous
/// complete output or the new one.
#[derive(Debug, Clone)]
pub struct FsBundleWriter {
    root: PathBuf,
}

impl FsBundleWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn stage(&self, bundle: &Bundle, staging: &Path) -> Result<()> {
        remove_dir_if_exists(staging).await?;
        fs::create_dir_all(staging)
            .await
            .map_err(|e| Error::io(staging, e))?;

        for file in &bundle.files {
            let path = staging.join(&file.name);
            fs::write(&path, file.contents.as_bytes())
                .await
                .map_err(|e| Error::io(&path, e))?;
            if file.executable {
                make_executable(&path).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BundleWriter for FsBundleWriter {
    async fn write(&self, bundle: &Bundle) -> Result<PathBuf> {
        let name = bundle.unit.dir_name();
        let target = self.root.join(name);
        let staging = self.root.join(format!(".{}.staging", name));
        let previous = self.root.join(format!(".{}.previous", name));

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::io(&self.root, e))?;

        if let Err(e) = self.stage(bundle, &staging).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        remove_dir_if_exists(&previous).await?;
        let had_previous = fs::try_exists(&target)
            .await
            .map_err(|e| Error::io(&target, e))?;
        if had_previous {
            fs::rename(&target, &previous)
                .await
                .map_err(|e| Error::io(&target, e))?;
        }

        if let Err(e) = fs::rename(&staging, &target).await {
            if had_previous {
                if let Err(restore) = fs::rename(&previous, &target).await {
                    warn!(path = %target.display(), error = %restore, "Failed to restore previous output");
                }
            }
            let _ = fs::remove_dir_all(&staging).await;
            return Err(Error::io(&target, e));
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&previous).await {
                warn!(path = %previous.display(), error = %e, "Failed to remove previous output");
            }
        }

        debug!(path = %target.display(), files = bundle.files.len(), "Bundle written");
        Ok(target)
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{BundleFile, Unit};
    use labgen_core::MachineKey;

    fn bundle(contents: &str) -> Bundle {
        Bundle {
            unit: Unit::Machine(MachineKey::from("driver")),
            services: vec!["web".to_string()],
            files: vec![
                BundleFile {
                    name: "docker-compose.yml".to_string(),
                    contents: contents.to_string(),
                    executable: false,
                },
                BundleFile {
                    name: "deploy.sh".to_string(),
                    contents: "#!/bin/sh\n".to_string(),
                    executable: true,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_writes_files_into_unit_dir() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsBundleWriter::new(dir.path());

        let path = writer.write(&bundle("services: {}\n")).await.unwrap();
        assert_eq!(path, dir.path().join("driver"));
        assert_eq!(
            std::fs::read_to_string(path.join("docker-compose.yml")).unwrap(),
            "services: {}\n"
        );
        assert!(!dir.path().join(".driver.staging").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = FsBundleWriter::new(dir.path())
            .write(&bundle("x"))
            .await
            .unwrap();
        let mode = std::fs::metadata(path.join("deploy.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_rewrite_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsBundleWriter::new(dir.path());

        let path = writer.write(&bundle("first\n")).await.unwrap();
        std::fs::write(path.join("stale.txt"), "left over").unwrap();

        writer.write(&bundle("second\n")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(path.join("docker-compose.yml")).unwrap(),
            "second\n"
        );
        assert!(!path.join("stale.txt").exists());
        assert!(!dir.path().join(".driver.previous").exists());
    }

    #[tokio::test]
    async fn test_stale_staging_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join(".driver.staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("junk"), "x").unwrap();

        let path = FsBundleWriter::new(dir.path())
            .write(&bundle("ok\n"))
            .await
            .unwrap();
        assert!(!path.join("junk").exists());
    }
}
