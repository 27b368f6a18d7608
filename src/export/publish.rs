use crate::aci::ArtifactSet;
use crate::config::PushConfig;
use crate::error::{Error, ErrorFieldExt, ErrorKind, Result, ResultExt};
use crate::manifest::FullyQualifiedName;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

/// Sends a compressed, signed image to wherever images are distributed from.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, artifacts: &ArtifactSet, name: &FullyQualifiedName) -> Result<()>;
}

/// Hands the image to an external command:
/// `<command> <args>... <image.gz.aci> <image.gz.aci.asc> <name:version>`
pub struct CommandPublisher {
    command: Option<PathBuf>,
    args: Vec<String>,
}

impl CommandPublisher {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl Publisher for CommandPublisher {
    async fn publish(&self, artifacts: &ArtifactSet, name: &FullyQualifiedName) -> Result<()> {
        let Some(command) = &self.command else {
            return Err(Error::new(ErrorKind::Publish, "No push command configured")
                .with_field("aci", name));
        };
        let image = artifacts.image_gz_aci();
        let signature = artifacts.image_gz_aci_asc();
        tracing::info!(aci = %name, path = %image.display(), "Pushing image");

        let status = Command::new(command)
            .args(&self.args)
            .arg(&image)
            .arg(&signature)
            .arg(name.to_string())
            .status()
            .await
            .err_ctx(ErrorKind::Publish, "Failed to start push command")
            .field("command", command.display())?;

        if !status.success() {
            return Err(Error::new(ErrorKind::Publish, "Push command failed")
                .with_field("command", command.display())
                .with_field("status", status)
                .with_field("aci", name));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_command_is_publish_error() {
        let publisher = CommandPublisher::new(&PushConfig::default());
        let artifacts = ArtifactSet::new("/t");
        let name: FullyQualifiedName = "example.com/app:1".parse().unwrap();
        let err = publisher.publish(&artifacts, &name).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Publish);
    }

    #[tokio::test]
    async fn test_command_receives_image_signature_and_name() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("received");
        let script = dir.path().join("push.sh");
        std::fs::write(&script, "echo \"$@\" > \"$1\"").unwrap();

        let publisher = CommandPublisher::new(&PushConfig {
            command: Some(PathBuf::from("/bin/sh")),
            args: vec![script.display().to_string(), out.display().to_string()],
        });
        let artifacts = ArtifactSet::new("/t");
        let name: FullyQualifiedName = "example.com/app:1".parse().unwrap();
        publisher.publish(&artifacts, &name).await.unwrap();

        let received = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            received.trim(),
            format!(
                "{} /t/image.gz.aci /t/image.gz.aci.asc example.com/app:1",
                out.display()
            )
        );
    }
}
