use super::{Aci, ArtifactSet, BuildStage, BuilderCommand};
use crate::archive;
use crate::constants::*;
use crate::error::{is_fatal, Error, ErrorFieldExt, ErrorKind, Result, ResultExt};
use crate::logging;
use crate::manifest::appc::ImageManifest;
use crate::manifest::{BuilderDefinition, FullyQualifiedName, Isolator};
use crate::ownership::OwnershipRestorer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// One run of a builder image: what it stages, how it is invoked, what it leaves behind.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub command: BuilderCommand,
    /// Identity the builder and stage1 image names are derived from
    pub name: FullyQualifiedName,
    pub builder: BuilderDefinition,
    pub builder_image: FullyQualifiedName,
    /// Dependencies written into the builder image manifest
    pub dependencies: Vec<FullyQualifiedName>,
    /// Dependencies fetched by the compatibility check
    pub fetch_dependencies: Vec<FullyQualifiedName>,
    pub stage1_dir: PathBuf,
    pub builder_dir: PathBuf,
    pub uuid_file: PathBuf,
}

/// Restores ownership of the target directory to the invoking user when dropped.
pub struct TargetGuard {
    path: PathBuf,
    ownership: Arc<dyn OwnershipRestorer>,
}

impl TargetGuard {
    pub fn new(path: impl Into<PathBuf>, ownership: Arc<dyn OwnershipRestorer>) -> Self {
        Self {
            path: path.into(),
            ownership,
        }
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        if let Err(e) = self.ownership.restore(&self.path) {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to give back user rights on target");
        }
    }
}

/// Images imported into the runtime for one run, evicted on cleanup
#[derive(Debug, Default)]
struct StagedImages {
    stage1: Option<String>,
    builder: Option<String>,
    invoked: bool,
}

/// Builder's base image manifest turned into the custom stage1: it depends on the builder
/// dependencies followed by the builder image itself, under `builder-stage1/<name>`.
pub fn stage1_manifest(
    mut base: ImageManifest,
    dependencies: &[FullyQualifiedName],
    builder_image: &FullyQualifiedName,
    name: &FullyQualifiedName,
) -> ImageManifest {
    base.set_dependencies(dependencies.iter().chain(std::iter::once(builder_image)));
    base.name = name.prefixed(PREFIX_BUILDER_STAGE1).name().to_string();
    base
}

fn advance(stage: &mut BuildStage, next: BuildStage) {
    *stage = next;
    crate::log_stage!(next);
}

async fn package(dir: &Path) -> Result<PathBuf> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || archive::package_directory(&dir))
        .await
        .err_ctx(ErrorKind::Archive, "Packaging task failed")?
}

async fn write_image_manifest(dir: &Path, manifest: &ImageManifest) -> Result<()> {
    let content = manifest
        .to_json_pretty()
        .err_ctx(ErrorKind::Manifest, "Failed to marshal image manifest")?;
    let path = dir.join(PATH_MANIFEST);
    tokio::fs::write(&path, content)
        .await
        .err_ctx(ErrorKind::Filesystem, "Failed to write image manifest")
        .field("path", path.display())
}

async fn create_dir(path: &Path, message: &'static str) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .err_ctx(ErrorKind::Filesystem, message)
        .field("path", path.display())
}

impl Aci {
    /// Plan producing this image with its declared builder
    pub fn build_plan(&self, command: BuilderCommand) -> Result<BuildPlan> {
        let manifest = &self.ctx.manifest;
        let artifacts = self.artifacts();
        Ok(BuildPlan {
            command,
            name: manifest.name_and_version.clone(),
            builder: manifest.builder.clone(),
            builder_image: manifest.builder.image_or(&self.default_builder_image()?),
            dependencies: manifest.aci.dependencies.clone(),
            fetch_dependencies: manifest.aci.dependencies.clone(),
            stage1_dir: artifacts.stage1_dir(),
            builder_dir: artifacts.builder_dir(),
            uuid_file: artifacts.builder_uuid(),
        })
    }

    pub(super) async fn run_builder_command(&self, plan: BuildPlan) -> Result<()> {
        let started = Instant::now();
        crate::log_build_start!(plan.command);

        let mut stage = BuildStage::Idle;
        let mut staged = StagedImages::default();
        let guard = TargetGuard::new(&self.ctx.target_path, self.services.ownership.clone());
        let result = self.run_stages(&plan, &mut stage, &mut staged).await;

        let result = match result {
            Ok(fullname) => {
                advance(&mut stage, BuildStage::Done);
                if let Some(fullname) = fullname {
                    crate::log_build_complete!(fullname, started.elapsed().as_millis() as u64);
                }
                Ok(())
            }
            Err(e) => {
                let failed_at = stage;
                advance(&mut stage, BuildStage::Failed);
                Err(e.with_field("stage", failed_at).with_fields(&self.ctx.fields))
            }
        };

        self.cleanup(&plan, &staged).await;
        drop(guard);
        result
    }

    async fn run_stages(
        &self,
        plan: &BuildPlan,
        stage: &mut BuildStage,
        staged: &mut StagedImages,
    ) -> Result<Option<FullyQualifiedName>> {
        self.check_dependencies(plan).await?;
        advance(stage, BuildStage::DependenciesChecked);

        self.prepare_target().await?;

        if let Some(hash) = self.prepare_stage1(plan).await? {
            staged.stage1 = Some(hash);
            advance(stage, BuildStage::Stage1Prepared);
        }

        let builder_hash = self.prepare_builder(plan).await?;
        staged.builder = Some(builder_hash.clone());
        advance(stage, BuildStage::BuilderPrepared);

        staged.invoked = true;
        self.invoke(plan, &builder_hash, staged.stage1.as_deref()).await?;
        advance(stage, BuildStage::Invoked);

        if plan.command != BuilderCommand::Build {
            return Ok(None);
        }
        let fullname = self.extract_result().await?;
        advance(stage, BuildStage::Extracted);
        Ok(Some(fullname))
    }

    /// Compatibility fetch and latest-version advisories, joined before the build goes on
    async fn check_dependencies(&self, plan: &BuildPlan) -> Result<()> {
        let compatibility = self.check_compatibility(&plan.fetch_dependencies);
        let latest = self.check_latest_versions();

        if self.ctx.options.parallel_build {
            let (compatibility, _) = tokio::join!(compatibility, latest);
            compatibility
        } else {
            let compatibility = compatibility.await;
            latest.await;
            compatibility
        }
    }

    async fn check_compatibility(&self, dependencies: &[FullyQualifiedName]) -> Result<()> {
        for dep in dependencies {
            tracing::info!(dependency = %dep, "Fetching dependency");
            self.services
                .runtime
                .fetch(&dep.to_string())
                .await
                .map_err(|e| {
                    Error::new(ErrorKind::DependencyCompatibility, "Cannot fetch dependency")
                        .with_field("dependency", dep)
                        .with_source(e)
                })?;
        }
        Ok(())
    }

    async fn prepare_target(&self) -> Result<()> {
        let artifacts = self.artifacts();
        create_dir(artifacts.target(), "Cannot create target directory").await?;
        let copy = artifacts.manifest_template();
        tokio::fs::write(&copy, &self.ctx.manifest_template)
            .await
            .err_ctx(ErrorKind::Filesystem, "Failed to write manifest template")
            .field("path", copy.display())
    }

    /// Custom stage1 carrying the builder dependencies, or `None` for the runtime default
    async fn prepare_stage1(&self, plan: &BuildPlan) -> Result<Option<String>> {
        if plan.builder.dependencies.is_empty() {
            return Ok(None);
        }
        tracing::debug!("Preparing stage1");
        create_dir(&plan.stage1_dir.join(PATH_ROOTFS), "Failed to create stage1 aci path").await?;

        let runtime = &self.services.runtime;
        let image = plan.builder_image.to_string();
        if let Err(e) = runtime.fetch(&image).await {
            tracing::warn!(error = %e, image = %image, "Failed to fetch builder image");
        }
        let content = runtime
            .cat_manifest(&image)
            .await
            .field("image", &image)?;
        let base = ImageManifest::from_json(content.as_bytes())
            .err_ctx(ErrorKind::Runtime, "Failed to unmarshal stage1 manifest received from rkt")
            .field("content", &content)?;

        let manifest = stage1_manifest(base, &plan.builder.dependencies, &plan.builder_image, &plan.name);
        write_image_manifest(&plan.stage1_dir, &manifest).await?;
        let archive = package(&plan.stage1_dir).await?;

        tracing::info!(path = %archive.display(), "Importing builder's stage1");
        let hash = runtime
            .fetch_insecure(&archive)
            .await
            .field("path", archive.display())?;
        Ok(Some(hash))
    }

    async fn prepare_builder(&self, plan: &BuildPlan) -> Result<String> {
        tracing::debug!("Preparing builder");
        let rootfs = plan.builder_dir.join(PATH_ROOTFS);
        create_dir(&rootfs, "Failed to create builder aci path").await?;
        let keep = rootfs.join(PATH_KEEP);
        tokio::fs::write(&keep, b"")
            .await
            .err_ctx(ErrorKind::Filesystem, "Failed to write keep file")
            .field("path", keep.display())?;

        let mut manifest = ImageManifest::from_aci_manifest(
            &self.ctx.manifest,
            &plan.name.prefixed(PREFIX_BUILDER),
            &self.services.tool_version,
        );
        manifest.set_dependencies(&plan.dependencies);
        manifest.set_isolators(vec![Isolator::retain_all_capabilities()]);
        write_image_manifest(&plan.builder_dir, &manifest).await?;
        let archive = package(&plan.builder_dir).await?;

        tracing::info!(path = %archive.display(), "Importing build to rkt");
        self.services
            .runtime
            .fetch_insecure(&archive)
            .await
            .field("path", archive.display())
    }

    /// Arguments of the builder run, in the order the runtime expects them
    pub fn run_arguments(
        &self,
        plan: &BuildPlan,
        builder_hash: &str,
        stage1_hash: Option<&str>,
        debug: bool,
        level: &str,
    ) -> Vec<String> {
        let options = &self.ctx.options;
        let env = |name: &str, value: &dyn std::fmt::Display| format!("--set-env={}={}", name, value);

        let mut args = Vec::new();
        if debug {
            args.push("--debug".to_string());
        }
        args.push(env(ENV_BUILDER_VERSION, &self.services.tool_version));
        args.push(env(ENV_LOG_LEVEL, &level));
        args.push(env(ENV_ACI_PATH, &self.ctx.source_path.display()));
        args.push(env(ENV_ACI_TARGET, &self.ctx.target_path.display()));
        args.push(env(ENV_BUILDER_COMMAND, &plan.command));
        args.push(env(ENV_CATCH_ON_ERROR, &options.catch_on_error));
        args.push(env(ENV_CATCH_ON_STEP, &options.catch_on_step));
        args.push("--net=host".to_string());
        args.push("--insecure-options=image".to_string());
        args.push(format!("--uuid-file-save={}", plan.uuid_file.display()));
        args.push("--interactive".to_string());
        match stage1_hash {
            Some(hash) => args.push(format!("--stage1-hash={}", hash)),
            None => args.push(format!("--stage1-name={}", plan.builder_image)),
        }
        args.extend(options.set_env.iter().map(|v| format!("--set-env={}", v)));
        args.push(builder_hash.to_string());
        args
    }

    async fn invoke(&self, plan: &BuildPlan, builder_hash: &str, stage1_hash: Option<&str>) -> Result<()> {
        let args = self.run_arguments(
            plan,
            builder_hash,
            stage1_hash,
            logging::is_debug_enabled(),
            &logging::level_name(),
        );
        tracing::info!("Calling rkt to start build");
        let status = self.services.runtime.run(&args).await?;
        if status != 0 {
            return Err(Error::new(ErrorKind::Invocation, "Builder container return with failed status")
                .with_field("status", status)
                .with_field("command", args.join(" ")));
        }
        Ok(())
    }

    /// Persist the produced manifest and version marker. The image and the marker are
    /// mandatory, an unreadable manifest inside the image is not.
    async fn extract_result(&self) -> Result<FullyQualifiedName> {
        let artifacts = self.artifacts();
        let image = artifacts.image_aci();
        if !tokio::fs::try_exists(&image).await.unwrap_or(false) {
            return Err(Error::new(ErrorKind::Invocation, "Builder did not produce an aci")
                .with_field("path", image.display()));
        }

        let fullname = match self.read_built_manifest(&artifacts).await {
            Ok(manifest) => manifest.name_and_version(),
            Err(e) if !is_fatal(&e) => {
                tracing::warn!(error = %e, "Failed to extract manifest.json, using declared name");
                self.ctx.manifest.name_and_version.clone()
            }
            Err(e) => return Err(e),
        };

        let marker = artifacts.version();
        tokio::fs::write(&marker, fullname.to_string())
            .await
            .err_ctx(ErrorKind::VersionMarker, "Failed to write version file in target")
            .field("path", marker.display())?;
        Ok(fullname)
    }

    async fn read_built_manifest(&self, artifacts: &ArtifactSet) -> Result<ImageManifest> {
        let image = artifacts.image_aci();
        let content = tokio::task::spawn_blocking(move || archive::extract_manifest(&image))
            .await
            .err_ctx(ErrorKind::Extraction, "Extraction task failed")??;

        let json = artifacts.manifest_json();
        if let Err(e) = tokio::fs::write(&json, &content).await {
            tracing::warn!(error = %e, path = %json.display(), "Failed to write manifest.json");
        }
        ImageManifest::from_json(&content)
            .err_ctx(ErrorKind::Extraction, "Cannot unmarshall json content")
            .field("content", String::from_utf8_lossy(&content))
    }

    /// Evict what the run imported. Failures are warnings.
    async fn cleanup(&self, plan: &BuildPlan, staged: &StagedImages) {
        let runtime = &self.services.runtime;
        if staged.invoked && !self.ctx.options.keep_builder {
            if let Err(e) = runtime.remove_instance_from_file(&plan.uuid_file).await {
                crate::log_cleanup_failure!(e, "build container");
            }
        }
        if let Some(hash) = &staged.builder {
            if let Err(e) = runtime.remove_image(hash).await {
                crate::log_cleanup_failure!(e.with_field("hash", hash), "build container image");
            }
        }
        if let Some(hash) = &staged.stage1 {
            if let Err(e) = runtime.remove_image(hash).await {
                crate::log_cleanup_failure!(e.with_field("hash", hash), "stage1 container image");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fqn(s: &str) -> FullyQualifiedName {
        s.parse().unwrap()
    }

    #[test]
    fn test_stage1_dependencies_end_with_builder_image() {
        let base = ImageManifest::from_json(
            br#"{"acKind":"ImageManifest","acVersion":"0.8.11","name":"z","dependencies":[{"imageName":"old"}]}"#,
        )
        .unwrap();
        let manifest = stage1_manifest(
            base,
            &[fqn("x:1"), fqn("y:2")],
            &fqn("z:3"),
            &fqn("example.com/app:1.0"),
        );

        let deps: Vec<String> = manifest
            .dependencies
            .iter()
            .map(|d| d.fullname().to_string())
            .collect();
        assert_eq!(deps, vec!["x:1", "y:2", "z:3"]);
        assert_eq!(manifest.name, "builder-stage1/example.com/app");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(BuildStage::DependenciesChecked.to_string(), "dependencies-checked");
        assert_eq!(BuilderCommand::Try.to_string(), "try");
    }

    #[test]
    fn test_guard_restores_on_drop() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Recording(Mutex<Vec<PathBuf>>);
        impl OwnershipRestorer for Recording {
            fn restore(&self, path: &Path) -> Result<()> {
                self.0.lock().unwrap().push(path.to_path_buf());
                Err(Error::new(ErrorKind::Filesystem, "chown failed"))
            }
        }

        let recording = Arc::new(Recording::default());
        {
            let _guard = TargetGuard::new("/t/target", recording.clone());
        }
        assert_eq!(*recording.0.lock().unwrap(), vec![PathBuf::from("/t/target")]);
    }
}
