use crate::config::Config;
use crate::constants::VERSION;
use crate::error::{ErrorKind, Result, ResultExt};
use crate::export::{CommandPublisher, GpgSigner, Publisher, Signer};
use crate::manifest::FullyQualifiedName;
use crate::ownership::{OwnershipRestorer, SudoOwnership};
use crate::runtime::{AppcDiscovery, RktClient, RuntimeBridge, VersionResolver};
use std::sync::Arc;

/// Process-wide collaborators, built once at startup and shared by every build.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub runtime: Arc<dyn RuntimeBridge>,
    pub resolver: Arc<dyn VersionResolver>,
    pub signer: Arc<dyn Signer>,
    pub publisher: Arc<dyn Publisher>,
    pub ownership: Arc<dyn OwnershipRestorer>,
    /// Written into produced images and passed to builders
    pub tool_version: String,
}

impl Services {
    /// Production wiring: rkt, appc discovery, gpg, the configured push command, sudo ownership
    pub fn from_config(config: Config) -> Result<Self> {
        let runtime = Arc::new(RktClient::new(&config.rkt));
        let resolver = Arc::new(AppcDiscovery::new(config.insecure_discovery)?);
        let signer = Arc::new(GpgSigner::new(&config.sign));
        let publisher = Arc::new(CommandPublisher::new(&config.push));
        Ok(Self {
            config: Arc::new(config),
            runtime,
            resolver,
            signer,
            publisher,
            ownership: Arc::new(SudoOwnership::from_env()),
            tool_version: VERSION.to_string(),
        })
    }

    pub fn default_builder_image(&self) -> Result<FullyQualifiedName> {
        self.config
            .default_builder_image
            .parse()
            .err_ctx(ErrorKind::Config, "Invalid default builder image")
    }
}
