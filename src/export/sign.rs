use crate::config::SignConfig;
use crate::constants::SUFFIX_ASC;
use crate::error::{Error, ErrorFieldExt, ErrorKind, Result, ResultExt};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Produces a detached signature next to a file.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `file` into `<file>.asc` and return the signature path
    async fn sign(&self, file: &Path) -> Result<PathBuf>;
}

pub fn signature_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_os_string();
    name.push(SUFFIX_ASC);
    PathBuf::from(name)
}

/// Armored detached signatures through an external `gpg`
pub struct GpgSigner {
    gpg: PathBuf,
    key_id: Option<String>,
    homedir: Option<PathBuf>,
}

impl GpgSigner {
    pub fn new(config: &SignConfig) -> Self {
        Self {
            gpg: config.gpg.clone(),
            key_id: config.key_id.clone(),
            homedir: config.homedir.clone(),
        }
    }

    fn args(&self, file: &Path, output: &Path) -> Vec<String> {
        let mut args = vec!["--batch".to_string(), "--yes".to_string()];
        if let Some(homedir) = &self.homedir {
            args.push("--homedir".into());
            args.push(homedir.display().to_string());
        }
        if let Some(key) = &self.key_id {
            args.push("--local-user".into());
            args.push(key.clone());
        }
        args.extend([
            "--armor".to_string(),
            "--output".to_string(),
            output.display().to_string(),
            "--detach-sign".to_string(),
            file.display().to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Signer for GpgSigner {
    async fn sign(&self, file: &Path) -> Result<PathBuf> {
        let output = signature_path(file);
        tracing::info!(path = %file.display(), "Signing");

        let result = Command::new(&self.gpg)
            .args(self.args(file, &output))
            .output()
            .await
            .err_ctx(ErrorKind::Signing, "Failed to start gpg")
            .field("gpg", self.gpg.display())?;

        if !result.status.success() {
            return Err(Error::new(ErrorKind::Signing, "Failed to sign image")
                .with_field("path", file.display())
                .with_field("status", result.status)
                .with_field("stderr", String::from_utf8_lossy(&result.stderr).trim()));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_path_appends_suffix() {
        assert_eq!(
            signature_path(Path::new("/t/image.gz.aci")),
            PathBuf::from("/t/image.gz.aci.asc")
        );
    }

    #[test]
    fn test_args_include_key_and_homedir() {
        let signer = GpgSigner::new(&SignConfig {
            gpg: PathBuf::from("gpg"),
            key_id: Some("ABCD".into()),
            homedir: Some(PathBuf::from("/keys")),
        });
        let args = signer.args(Path::new("/t/image.aci"), Path::new("/t/image.aci.asc"));
        assert_eq!(
            args,
            vec![
                "--batch", "--yes", "--homedir", "/keys", "--local-user", "ABCD", "--armor",
                "--output", "/t/image.aci.asc", "--detach-sign", "/t/image.aci",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_gpg_is_signing_error() {
        let signer = GpgSigner::new(&SignConfig {
            gpg: PathBuf::from("false"),
            key_id: None,
            homedir: None,
        });
        let err = signer.sign(Path::new("/nonexistent/image.aci")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signing);
    }
}
