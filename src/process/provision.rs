//! # Binary provisioning: install bundled artifacts and fix permissions.
//!
//! Stage binaries ship as bundled assets in a read-only directory and must
//! be copied into a private, executable location before the first launch.
//!
//! ## Rules
//! - Copy happens when the target is missing, or always under
//!   `always_copy` (upgrade-friendly at the cost of a copy per start).
//! - After install the executable bit is **verified**, not assumed; when
//!   `set_permissions` does not stick (some overlay filesystems ignore it)
//!   a `chmod` subprocess is tried before giving up.
//! - Key material is tightened to owner-only (`0600`) the same way, since
//!   standard SSH clients refuse group/world-readable identity files.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::process::Command;

use crate::config::ProvisionConfig;
use crate::error::TunnelError;

/// Installs bundled stage binaries and secures key files.
#[derive(Debug, Clone)]
pub struct Provisioner {
    cfg: ProvisionConfig,
}

impl Provisioner {
    pub fn new(cfg: ProvisionConfig) -> Self {
        Self { cfg }
    }

    /// Ensures `name` is installed and executable; returns its install path.
    pub async fn ensure(&self, name: &str) -> Result<PathBuf, TunnelError> {
        let target = self.cfg.install_dir.join(name);
        let installed = fs::try_exists(&target).await.unwrap_or(false);

        if self.cfg.always_copy || !installed {
            let source = self.cfg.source_dir.join(name);
            if !fs::try_exists(&source).await.unwrap_or(false) {
                return Err(TunnelError::Provision {
                    name: name.to_string(),
                    reason: format!("bundled artifact not found at {}", source.display()),
                });
            }
            fs::create_dir_all(&self.cfg.install_dir)
                .await
                .map_err(|e| TunnelError::Provision {
                    name: name.to_string(),
                    reason: format!("create {}: {e}", self.cfg.install_dir.display()),
                })?;
            fs::copy(&source, &target)
                .await
                .map_err(|e| TunnelError::Provision {
                    name: name.to_string(),
                    reason: format!("copy to {}: {e}", target.display()),
                })?;
        }

        self.make_executable(&target, name).await?;
        Ok(target)
    }

    /// Restricts a key file to owner read/write and verifies the result.
    pub async fn secure_key(&self, path: &Path) -> Result<(), TunnelError> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Err(TunnelError::Provision {
                name: path.display().to_string(),
                reason: "key file not found".into(),
            });
        }
        set_mode(path, 0o600).await;
        if !mode_is(path, |mode| mode & 0o077 == 0).await {
            chmod_fallback(path, "600").await;
        }
        if mode_is(path, |mode| mode & 0o077 == 0).await {
            Ok(())
        } else {
            Err(TunnelError::Provision {
                name: path.display().to_string(),
                reason: "could not restrict key permissions to owner-only".into(),
            })
        }
    }

    async fn make_executable(&self, target: &Path, name: &str) -> Result<(), TunnelError> {
        set_mode(target, 0o755).await;
        if !mode_is(target, |mode| mode & 0o100 != 0).await {
            chmod_fallback(target, "755").await;
        }
        if mode_is(target, |mode| mode & 0o100 != 0).await {
            Ok(())
        } else {
            Err(TunnelError::Provision {
                name: name.to_string(),
                reason: format!("{} is not executable after install", target.display()),
            })
        }
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) {
    use std::fs::Permissions;
    use std::os::unix::fs::PermissionsExt;
    // Verified afterwards; the chmod fallback covers a silent no-op here.
    let _ = fs::set_permissions(path, Permissions::from_mode(mode)).await;
}

#[cfg(unix)]
async fn mode_is(path: &Path, check: impl Fn(u32) -> bool) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path).await {
        Ok(meta) => check(meta.permissions().mode()),
        Err(_) => false,
    }
}

async fn chmod_fallback(path: &Path, mode: &str) {
    let _ = Command::new("chmod")
        .arg(mode)
        .arg(path)
        .status()
        .await;
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) {}

#[cfg(not(unix))]
async fn mode_is(_path: &Path, _check: impl Fn(u32) -> bool) -> bool {
    true
}
