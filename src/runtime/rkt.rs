use crate::config::RktConfig;
use crate::error::{Error, ErrorFieldExt, ErrorKind, Result, ResultExt};
use crate::runtime::RuntimeBridge;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// [`RuntimeBridge`] backed by the `rkt` command line
pub struct RktClient {
    pub path: PathBuf,
    pub global_args: Vec<String>,
}

impl RktClient {
    pub fn new(config: &RktConfig) -> Self {
        Self {
            path: config.path.clone(),
            global_args: config.global_args.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.global_args);
        cmd
    }

    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.path.display().to_string()];
        parts.extend(self.global_args.iter().cloned());
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    /// Run a short-lived rkt command and return its trimmed stdout
    async fn output(&self, args: Vec<String>) -> Result<String> {
        let command = self.describe(&args);
        tracing::debug!(command = %command, "Calling rkt");

        let output = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .err_ctx(ErrorKind::Runtime, "Failed to start rkt")
            .field("command", &command)?;

        if !output.status.success() {
            return Err(Error::new(ErrorKind::Runtime, "rkt command failed")
                .with_field("command", command)
                .with_field("status", output.status)
                .with_field("stderr", String::from_utf8_lossy(&output.stderr).trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn last_line(stdout: &str) -> String {
        stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl RuntimeBridge for RktClient {
    async fn fetch(&self, image: &str) -> Result<String> {
        let stdout = self
            .output(vec!["fetch".into(), "--full=true".into(), image.into()])
            .await?;
        Ok(Self::last_line(&stdout))
    }

    async fn fetch_insecure(&self, archive: &Path) -> Result<String> {
        let stdout = self
            .output(vec![
                "fetch".into(),
                "--insecure-options=image".into(),
                "--full=true".into(),
                archive.display().to_string(),
            ])
            .await?;
        let hash = Self::last_line(&stdout);
        if hash.is_empty() {
            return Err(Error::new(ErrorKind::Runtime, "rkt fetch returned no image hash")
                .with_field("path", archive.display()));
        }
        Ok(hash)
    }

    async fn cat_manifest(&self, image: &str) -> Result<String> {
        self.output(vec!["image".into(), "cat-manifest".into(), image.into()])
            .await
    }

    async fn run(&self, args: &[String]) -> Result<i32> {
        let mut run_args = vec!["run".to_string()];
        run_args.extend(args.iter().cloned());
        let command = self.describe(&run_args);
        tracing::debug!(command = %command, "Running rkt");

        let status = self
            .command()
            .args(&run_args)
            .status()
            .await
            .err_ctx(ErrorKind::Runtime, "Failed to start rkt")
            .field("command", &command)?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn remove_instance_from_file(&self, uuid_file: &Path) -> Result<()> {
        self.output(vec![
            "rm".into(),
            format!("--uuid-file={}", uuid_file.display()),
        ])
        .await
        .map(|_| ())
    }

    async fn remove_image(&self, hash: &str) -> Result<()> {
        self.output(vec!["image".into(), "rm".into(), hash.into()])
            .await
            .map(|_| ())
    }
}
