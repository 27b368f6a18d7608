//! Build manifest model.
//!
//! An `aci-manifest.yml` names the image, describes its application and lists the
//! dependencies of the image, of its builder and of its optional tester.

pub mod appc;
pub mod fullname;
pub mod template;

pub use fullname::{FullyQualifiedName, NameError};
pub use template::{render, ManifestError, ManifestErrorReason};

use serde::{Deserialize, Serialize};

/// Rendered build manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AciManifest {
    #[serde(rename = "name")]
    pub name_and_version: FullyQualifiedName,
    pub aci: AciDefinition,
    pub builder: BuilderDefinition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tester: Option<TesterDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AciDefinition {
    pub app: Option<App>,
    pub annotations: Vec<Annotation>,
    pub dependencies: Vec<FullyQualifiedName>,
    pub path_whitelist: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuilderDefinition {
    pub image: Option<FullyQualifiedName>,
    pub dependencies: Vec<FullyQualifiedName>,
}

impl BuilderDefinition {
    /// Declared builder image, or `default` when the manifest names none
    pub fn image_or(&self, default: &FullyQualifiedName) -> FullyQualifiedName {
        self.image.clone().unwrap_or_else(|| default.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TesterDefinition {
    pub builder: BuilderDefinition,
    pub aci: TesterAciDefinition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TesterAciDefinition {
    pub dependencies: Vec<FullyQualifiedName>,
}

/// Application section, shared by the YAML manifest and the appc JSON manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct App {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<String>,
    pub user: String,
    pub group: String,
    #[serde(rename = "supplementaryGIDs", skip_serializing_if = "Vec::is_empty")]
    pub supplementary_gids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<NameValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub isolators: Vec<Isolator>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub event_handlers: Vec<serde_json::Value>,
}

impl Default for App {
    fn default() -> Self {
        Self {
            exec: Vec::new(),
            user: "0".to_string(),
            group: "0".to_string(),
            supplementary_gids: Vec::new(),
            working_directory: None,
            environment: Vec::new(),
            isolators: Vec::new(),
            mount_points: Vec::new(),
            ports: Vec::new(),
            event_handlers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

pub type Annotation = NameValue;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isolator {
    pub name: String,
    pub value: serde_json::Value,
}

impl Isolator {
    /// Capability retain set holding every capability
    pub fn retain_all_capabilities() -> Self {
        Self {
            name: crate::constants::ISOLATOR_CAPABILITIES_RETAIN.to_string(),
            value: serde_json::json!({ "set": ["all"] }),
        }
    }
}
