use crate::constants::*;
use std::path::{Path, PathBuf};

/// Fixed artifact layout under a build's target directory.
///
/// Presence of a file is the only record that it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    target: PathBuf,
}

impl ArtifactSet {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn image_aci(&self) -> PathBuf {
        self.target.join(PATH_IMAGE_ACI)
    }

    pub fn image_aci_asc(&self) -> PathBuf {
        self.target.join(PATH_IMAGE_ACI_ASC)
    }

    pub fn image_gz_aci(&self) -> PathBuf {
        self.target.join(PATH_IMAGE_GZ_ACI)
    }

    pub fn image_gz_aci_asc(&self) -> PathBuf {
        self.target.join(PATH_IMAGE_GZ_ACI_ASC)
    }

    pub fn manifest_json(&self) -> PathBuf {
        self.target.join(PATH_MANIFEST_JSON)
    }

    pub fn version(&self) -> PathBuf {
        self.target.join(PATH_VERSION)
    }

    pub fn manifest_template(&self) -> PathBuf {
        self.target.join(PATH_ACI_MANIFEST)
    }

    pub fn stage1_dir(&self) -> PathBuf {
        self.target.join(PATH_STAGE1)
    }

    pub fn builder_dir(&self) -> PathBuf {
        self.target.join(PATH_BUILDER)
    }

    pub fn tester_stage1_dir(&self) -> PathBuf {
        self.target.join(PATH_TESTER_STAGE1)
    }

    pub fn tester_dir(&self) -> PathBuf {
        self.target.join(PATH_TESTER)
    }

    pub fn builder_uuid(&self) -> PathBuf {
        self.target.join(PATH_BUILDER_UUID)
    }

    pub fn tester_uuid(&self) -> PathBuf {
        self.target.join(PATH_TESTER_UUID)
    }
}
