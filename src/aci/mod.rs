//! Build orchestration for a single image project.

mod artifacts;
mod build;
mod tester;

pub use artifacts::ArtifactSet;
pub use build::{stage1_manifest, BuildPlan, TargetGuard};

use crate::archive;
use crate::check::{check_latest_version, Advisory};
use crate::constants::{PATH_ACI_MANIFEST, PATH_TARGET};
use crate::error::{Error, ErrorFieldExt, ErrorKind, Fields, Result, ResultExt};
use crate::graph::DependencyGraph;
use crate::manifest::{render, AciManifest, FullyQualifiedName};
use crate::services::Services;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

/// Sub-command the builder is asked to perform, passed as `BUILDER_COMMAND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderCommand {
    Build,
    Test,
    Try,
}

impl fmt::Display for BuilderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => f.write_str("build"),
            Self::Test => f.write_str("test"),
            Self::Try => f.write_str("try"),
        }
    }
}

/// Pipeline states. `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Idle,
    DependenciesChecked,
    Stage1Prepared,
    BuilderPrepared,
    Invoked,
    Extracted,
    Done,
    Failed,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::DependenciesChecked => "dependencies-checked",
            Self::Stage1Prepared => "stage1-prepared",
            Self::BuilderPrepared => "builder-prepared",
            Self::Invoked => "invoked",
            Self::Extracted => "extracted",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Keep the builder instance after it exits
    pub keep_builder: bool,
    /// Builder traps to a shell when a step fails
    pub catch_on_error: bool,
    /// Builder traps to a shell on every step
    pub catch_on_step: bool,
    /// Run the dependency checks concurrently
    pub parallel_build: bool,
    /// Extra `NAME=value` assignments for the builder
    pub set_env: Vec<String>,
    /// Fail when the manifest declares no tester
    pub no_test_fail: bool,
    /// Run tests before install and push
    pub test: bool,
}

/// Everything one build needs, owned by its [`Aci`]
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub manifest_template: String,
    pub manifest: AciManifest,
    pub options: BuildOptions,
    pub fields: Fields,
}

pub struct Aci {
    ctx: BuildContext,
    services: Arc<Services>,
}

impl Aci {
    /// Load `<path>/aci-manifest.yml`
    pub fn from_path(path: &Path, options: BuildOptions, services: Arc<Services>) -> Result<Self> {
        let file = path.join(PATH_ACI_MANIFEST);
        let template = std::fs::read_to_string(&file)
            .err_ctx(ErrorKind::Manifest, "Cannot read manifest")
            .field("path", file.display())?;
        Self::new(path, template, options, services)
    }

    pub fn new(
        path: &Path,
        template: String,
        options: BuildOptions,
        services: Arc<Services>,
    ) -> Result<Self> {
        let manifest = render(&template).map_err(|e| Error::from(e).with_field("path", path.display()))?;
        let fields = Fields::new().with("aci", &manifest.name_and_version);

        let source_path = absolute(path).fields(&fields)?;
        let target_path = match &services.config.target_work_dir {
            Some(work_dir) => absolute(&work_dir.join(manifest.name_and_version.short_name()))
                .field("path", work_dir.display())
                .fields(&fields)?,
            None => source_path.join(PATH_TARGET),
        };
        let fields = fields.with("path", source_path.display());
        tracing::debug!(aci = %manifest.name_and_version, path = %source_path.display(), options = ?options, "New aci");

        Ok(Self {
            ctx: BuildContext {
                source_path,
                target_path,
                manifest_template: template,
                manifest,
                options,
                fields,
            },
            services,
        })
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub fn manifest(&self) -> &AciManifest {
        &self.ctx.manifest
    }

    pub fn artifacts(&self) -> ArtifactSet {
        ArtifactSet::new(&self.ctx.target_path)
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "aci",
            aci = %self.ctx.manifest.name_and_version,
            path = %self.ctx.source_path.display()
        )
    }

    fn default_builder_image(&self) -> Result<FullyQualifiedName> {
        self.services.default_builder_image().fields(&self.ctx.fields)
    }

    /// Remove the target directory. Failures are logged, never returned.
    pub async fn clean(&self) {
        let target = &self.ctx.target_path;
        tracing::debug!(path = %target.display(), "Cleaning");
        if let Err(e) = tokio::fs::remove_dir_all(target).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %target.display(), "Failed to clean target");
            }
        }
    }

    pub async fn build(&self) -> Result<ArtifactSet> {
        let plan = self.build_plan(BuilderCommand::Build)?;
        self.run_builder_command(plan).instrument(self.span()).await?;
        Ok(self.artifacts())
    }

    pub async fn clean_and_build(&self) -> Result<ArtifactSet> {
        self.clean().await;
        self.build().await
    }

    /// Build without producing the result image (templating dry run)
    pub async fn clean_and_try(&self) -> Result<()> {
        self.clean().await;
        let plan = self.build_plan(BuilderCommand::Try)?;
        self.run_builder_command(plan).instrument(self.span()).await
    }

    pub async fn ensure_built(&self) -> Result<()> {
        if !self.artifacts().image_aci().exists() {
            self.clean_and_build().await?;
        }
        Ok(())
    }

    pub async fn ensure_sign(&self) -> Result<()> {
        if !self.artifacts().image_aci_asc().exists() {
            self.sign().await?;
        }
        Ok(())
    }

    pub async fn ensure_zip(&self) -> Result<()> {
        if !self.artifacts().image_gz_aci().exists() {
            self.ensure_built().await?;
            self.zip().await?;
        }
        Ok(())
    }

    pub async fn ensure_zip_sign(&self) -> Result<()> {
        if !self.artifacts().image_gz_aci_asc().exists() {
            self.zip_sign().await?;
        }
        Ok(())
    }

    pub async fn sign(&self) -> Result<PathBuf> {
        self.ensure_built().await?;
        self.services
            .signer
            .sign(&self.artifacts().image_aci())
            .instrument(self.span())
            .await
            .fields(&self.ctx.fields)
    }

    async fn zip_sign(&self) -> Result<PathBuf> {
        self.ensure_zip().await?;
        self.services
            .signer
            .sign(&self.artifacts().image_gz_aci())
            .instrument(self.span())
            .await
            .fields(&self.ctx.fields)
    }

    async fn zip(&self) -> Result<PathBuf> {
        let artifacts = self.artifacts();
        let (source, target) = (artifacts.image_aci(), artifacts.image_gz_aci());
        let options = self.services.config.compression;
        let span = self.span();
        tokio::task::spawn_blocking(move || span.in_scope(|| archive::compress(&source, &target, options)))
            .await
            .err_ctx(ErrorKind::Archive, "Compression task failed")
            .fields(&self.ctx.fields)?
            .fields(&self.ctx.fields)
    }

    /// Import the built image into the local runtime store
    pub async fn install(&self) -> Result<Vec<String>> {
        if self.ctx.options.test {
            self.test().await?;
        }
        self.ensure_built().await?;

        let image = self.artifacts().image_aci();
        let hash = self
            .services
            .runtime
            .fetch_insecure(&image)
            .instrument(self.span())
            .await
            .fields(&self.ctx.fields)?;
        tracing::info!(aci = %self.ctx.manifest.name_and_version, hash = %hash, "Installed");
        Ok(vec![hash])
    }

    pub async fn push(&self) -> Result<()> {
        if self.ctx.options.test {
            self.test().await?;
        }
        self.ensure_zip().await?;
        self.ensure_zip_sign().await?;
        self.services
            .publisher
            .publish(&self.artifacts(), &self.ctx.manifest.name_and_version)
            .instrument(self.span())
            .await
            .fields(&self.ctx.fields)
    }

    /// Write the dependency graph of this image into the target directory
    pub async fn graph(&self) -> Result<PathBuf> {
        let target = &self.ctx.target_path;
        tokio::fs::create_dir_all(target)
            .await
            .err_ctx(ErrorKind::Filesystem, "Cannot create target directory")
            .fields(&self.ctx.fields)?;
        let graph = DependencyGraph::from_manifest(&self.ctx.manifest, &self.default_builder_image()?);
        graph.write(target).instrument(self.span()).await.fields(&self.ctx.fields)
    }

    /// Advisories for every dependency class of the manifest. Never fails.
    pub async fn check_latest_versions(&self) -> Vec<Advisory> {
        let manifest = &self.ctx.manifest;
        let resolver = self.services.resolver.as_ref();
        let mut advisories = check_latest_version(resolver, &manifest.aci.dependencies, "dependency").await;
        advisories.extend(
            check_latest_version(resolver, &manifest.builder.dependencies, "builder dependency").await,
        );
        if let Some(tester) = &manifest.tester {
            advisories.extend(
                check_latest_version(
                    resolver,
                    &tester.builder.dependencies,
                    "tester builder dependency",
                )
                .await,
            );
            advisories.extend(
                check_latest_version(resolver, &tester.aci.dependencies, "tester dependency").await,
            );
        }
        advisories
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .err_ctx(ErrorKind::Filesystem, "Cannot get fullpath of project")
        .field("path", path.display())
}
