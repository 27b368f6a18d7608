//! appc image manifest, the JSON stored as `manifest` inside every image archive.

use super::{AciManifest, Annotation, App, FullyQualifiedName, Isolator, NameValue};
use crate::constants::{
    AC_KIND_IMAGE_MANIFEST, AC_VERSION, ANNOTATION_BUILDER_VERSION, LABEL_ARCH, LABEL_OS,
    LABEL_VERSION,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub ac_kind: String,
    pub ac_version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<NameValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path_whitelist: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
    /// Keys this model does not know, kept so foreign manifests round-trip
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub image_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<NameValue>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<&FullyQualifiedName> for Dependency {
    fn from(name: &FullyQualifiedName) -> Self {
        let labels = name
            .version()
            .map(|v| {
                vec![NameValue {
                    name: LABEL_VERSION.to_string(),
                    value: v.to_string(),
                }]
            })
            .unwrap_or_default();
        Self {
            image_name: name.name().to_string(),
            labels,
            extra: Default::default(),
        }
    }
}

impl Dependency {
    pub fn fullname(&self) -> FullyQualifiedName {
        let version = self
            .labels
            .iter()
            .find(|l| l.name == LABEL_VERSION)
            .map(|l| l.value.clone());
        FullyQualifiedName::new(self.image_name.clone(), version)
    }
}

impl ImageManifest {
    pub fn from_json(content: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(content)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// `name[:version]` as recorded in the image labels
    pub fn name_and_version(&self) -> FullyQualifiedName {
        FullyQualifiedName::new(
            self.name.clone(),
            self.label(LABEL_VERSION).map(str::to_string),
        )
    }

    /// Replace dependencies, keeping the given order
    pub fn set_dependencies<'a>(&mut self, deps: impl IntoIterator<Item = &'a FullyQualifiedName>) {
        self.dependencies = deps.into_iter().map(Dependency::from).collect();
    }

    /// Image manifest generated from a build manifest, published under `name`
    pub fn from_aci_manifest(manifest: &AciManifest, name: &FullyQualifiedName, tool_version: &str) -> Self {
        let mut labels = Vec::new();
        if let Some(version) = manifest.name_and_version.version() {
            labels.push(NameValue {
                name: LABEL_VERSION.to_string(),
                value: version.to_string(),
            });
        }
        labels.push(NameValue {
            name: LABEL_OS.to_string(),
            value: "linux".to_string(),
        });
        labels.push(NameValue {
            name: LABEL_ARCH.to_string(),
            value: "amd64".to_string(),
        });

        let mut annotations = manifest.aci.annotations.clone();
        annotations.push(NameValue {
            name: ANNOTATION_BUILDER_VERSION.to_string(),
            value: tool_version.to_string(),
        });

        let mut image = Self {
            ac_kind: AC_KIND_IMAGE_MANIFEST.to_string(),
            ac_version: AC_VERSION.to_string(),
            name: name.name().to_string(),
            labels,
            app: manifest.aci.app.clone(),
            dependencies: Vec::new(),
            path_whitelist: manifest.aci.path_whitelist.clone(),
            annotations,
            extra: Default::default(),
        };
        image.set_dependencies(&manifest.aci.dependencies);
        image
    }

    /// Replace every isolator of the app with `isolators`, creating the app if needed
    pub fn set_isolators(&mut self, isolators: Vec<Isolator>) {
        self.app.get_or_insert_with(App::default).isolators = isolators;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::render;

    #[test]
    fn test_unknown_keys_round_trip() {
        let json = br#"{"acKind":"ImageManifest","acVersion":"0.8.11","name":"stage1/base","labels":[{"name":"version","value":"7"}],"app":{"exec":["/init"],"user":"0","group":"0"},"custom":{"x":1}}"#;
        let m = ImageManifest::from_json(json).unwrap();
        assert_eq!(m.name_and_version().to_string(), "stage1/base:7");
        assert_eq!(m.extra["custom"]["x"], 1);

        let again = ImageManifest::from_json(&m.to_json_pretty().unwrap()).unwrap();
        assert_eq!(again, m);
    }

    #[test]
    fn test_from_aci_manifest() {
        let aci = render(
            "name: example.com/app:1.2\naci:\n  dependencies: ['base:3', 'libs']\n  annotations:\n    - {name: a, value: b}\n",
        )
        .unwrap();
        let name = aci.name_and_version.prefixed("builder/");
        let image = ImageManifest::from_aci_manifest(&aci, &name, "0.2.0");

        assert_eq!(image.name, "builder/example.com/app");
        assert_eq!(image.label("version"), Some("1.2"));
        assert_eq!(image.label("os"), Some("linux"));
        let deps: Vec<String> = image.dependencies.iter().map(|d| d.fullname().to_string()).collect();
        assert_eq!(deps, vec!["base:3", "libs"]);
        assert_eq!(image.annotations.last().unwrap().value, "0.2.0");
    }

    #[test]
    fn test_set_isolators_creates_app() {
        let aci = render("name: a").unwrap();
        let mut image = ImageManifest::from_aci_manifest(&aci, &aci.name_and_version, "0");
        image.set_isolators(vec![Isolator::retain_all_capabilities()]);
        let app = image.app.unwrap();
        assert_eq!(app.isolators.len(), 1);
        assert_eq!(app.isolators[0].value["set"][0], "all");
    }
}
