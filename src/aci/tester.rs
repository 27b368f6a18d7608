use super::{Aci, BuildPlan, BuilderCommand};
use crate::constants::PREFIX_TEST;
use crate::error::{Error, ErrorFieldExt, ErrorKind, Result};
use tracing::Instrument;

impl Aci {
    /// Plan running the tester builder against the built image, or `None` without a tester
    pub fn test_plan(&self) -> Result<Option<BuildPlan>> {
        let manifest = &self.ctx.manifest;
        let Some(tester) = &manifest.tester else {
            return Ok(None);
        };
        let artifacts = self.artifacts();

        let mut dependencies = tester.aci.dependencies.clone();
        dependencies.push(manifest.name_and_version.clone());

        Ok(Some(BuildPlan {
            command: BuilderCommand::Test,
            name: manifest.name_and_version.prefixed(PREFIX_TEST),
            builder: tester.builder.clone(),
            builder_image: tester.builder.image_or(&self.default_builder_image()?),
            dependencies,
            fetch_dependencies: tester.aci.dependencies.clone(),
            stage1_dir: artifacts.tester_stage1_dir(),
            builder_dir: artifacts.tester_dir(),
            uuid_file: artifacts.tester_uuid(),
        }))
    }

    /// Build if needed, then run the tester builder with the built image as a dependency.
    pub async fn test(&self) -> Result<()> {
        self.ensure_built().await?;

        let Some(plan) = self.test_plan()? else {
            if self.ctx.options.no_test_fail {
                return Err(Error::new(ErrorKind::NoTests, "No tests found").with_fields(&self.ctx.fields));
            }
            tracing::warn!(aci = %self.ctx.manifest.name_and_version, "No tests found");
            return Ok(());
        };

        // The tester resolves the image under test from the local store.
        let image = self.artifacts().image_aci();
        let hash = self
            .services
            .runtime
            .fetch_insecure(&image)
            .await
            .field("path", image.display())
            .fields(&self.ctx.fields)?;
        tracing::debug!(hash = %hash, "Imported image under test");

        let result = self.run_builder_command(plan).instrument(self.span()).await;
        if let Err(e) = self.services.runtime.remove_image(&hash).await {
            crate::log_cleanup_failure!(e.with_field("hash", &hash), "image under test");
        }
        result?;
        tracing::info!(aci = %self.ctx.manifest.name_and_version, "Tests passed");
        Ok(())
    }
}
