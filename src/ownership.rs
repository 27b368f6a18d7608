use crate::error::{Error, ErrorFieldExt, ErrorKind, Result, ResultExt};
use std::path::Path;
use std::process::Command;

/// Gives produced files back to the user who started the build.
pub trait OwnershipRestorer: Send + Sync {
    fn restore(&self, path: &Path) -> Result<()>;
}

/// `chown -R $SUDO_UID:$SUDO_GID` when running under sudo, no-op otherwise.
///
/// Synchronous so it can run from a `Drop` impl.
#[derive(Debug, Clone, Default)]
pub struct SudoOwnership {
    owner: Option<(String, String)>,
}

impl SudoOwnership {
    pub fn from_env() -> Self {
        let uid = std::env::var("SUDO_UID").ok().filter(|v| !v.is_empty());
        let gid = std::env::var("SUDO_GID").ok().filter(|v| !v.is_empty());
        Self {
            owner: uid.zip(gid),
        }
    }

    pub fn with_owner(uid: impl Into<String>, gid: impl Into<String>) -> Self {
        Self {
            owner: Some((uid.into(), gid.into())),
        }
    }
}

impl OwnershipRestorer for SudoOwnership {
    fn restore(&self, path: &Path) -> Result<()> {
        let Some((uid, gid)) = &self.owner else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let owner = format!("{}:{}", uid, gid);
        tracing::debug!(path = %path.display(), owner = %owner, "Restoring ownership");

        let output = Command::new("chown")
            .arg("-R")
            .arg(&owner)
            .arg(path)
            .output()
            .err_ctx(ErrorKind::Filesystem, "Failed to start chown")
            .field("path", path.display())?;
        if !output.status.success() {
            return Err(Error::new(ErrorKind::Filesystem, "Failed to restore ownership")
                .with_field("path", path.display())
                .with_field("owner", owner)
                .with_field("stderr", String::from_utf8_lossy(&output.stderr).trim()));
        }
        Ok(())
    }
}
