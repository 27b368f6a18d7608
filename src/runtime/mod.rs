use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub mod discovery;
pub mod rkt;

pub use discovery::AppcDiscovery;
pub use rkt::RktClient;

/// Isolation runtime the builder images are imported into and run by.
#[async_trait]
pub trait RuntimeBridge: Send + Sync {
    /// Make `image` present in the local cache, verifying its signature. Returns its hash.
    async fn fetch(&self, image: &str) -> Result<String>;

    /// Import a local, unsigned archive. Returns its content hash.
    async fn fetch_insecure(&self, archive: &Path) -> Result<String>;

    /// Embedded manifest of a cached image, as JSON text
    async fn cat_manifest(&self, image: &str) -> Result<String>;

    /// Run an image as an isolated instance, blocking until it exits. Returns the exit code.
    async fn run(&self, args: &[String]) -> Result<i32>;

    /// Stop and remove the instance whose UUID was saved to `uuid_file`
    async fn remove_instance_from_file(&self, uuid_file: &Path) -> Result<()>;

    /// Evict an image from the local cache
    async fn remove_image(&self, hash: &str) -> Result<()>;
}

/// Source of the latest published version of an image name.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    async fn latest_version(&self, name: &str) -> Result<Option<String>>;
}
