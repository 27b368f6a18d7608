use super::{AciDefinition, AciManifest, BuilderDefinition, FullyQualifiedName, TesterDefinition};
use crate::error::{Error, ErrorKind};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestErrorReason {
    MissingName,
    Malformed,
}

impl fmt::Display for ManifestErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingName => f.write_str("name is mandatory in manifest"),
            Self::Malformed => f.write_str("malformed manifest"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct ManifestError {
    pub reason: ManifestErrorReason,
    /// Offending template text
    pub content: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ManifestError {
    fn missing_name(content: &str) -> Self {
        Self {
            reason: ManifestErrorReason::MissingName,
            content: content.to_string(),
            source: None,
        }
    }

    fn malformed(content: &str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            reason: ManifestErrorReason::Malformed,
            content: content.to_string(),
            source: Some(source.into()),
        }
    }
}

impl From<ManifestError> for Error {
    fn from(err: ManifestError) -> Self {
        let content = err.content.clone();
        Error::new(ErrorKind::Manifest, "Failed to process manifest")
            .with_field("content", content)
            .with_source(err)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    aci: AciDefinition,
    #[serde(default)]
    builder: BuilderDefinition,
    #[serde(default)]
    tester: Option<TesterDefinition>,
}

/// Parse a manifest template into an [`AciManifest`].
///
/// Pure: the template is the only input.
pub fn render(template: &str) -> Result<AciManifest, ManifestError> {
    if template.trim().is_empty() {
        return Err(ManifestError::missing_name(template));
    }

    let raw: RawManifest =
        serde_yaml::from_str(template).map_err(|e| ManifestError::malformed(template, e))?;

    let name = match raw.name.as_deref().map(str::trim) {
        None | Some("") => return Err(ManifestError::missing_name(template)),
        Some(name) => name
            .parse::<FullyQualifiedName>()
            .map_err(|e| ManifestError::malformed(template, e))?,
    };

    Ok(AciManifest {
        name_and_version: name,
        aci: raw.aci,
        builder: raw.builder,
        tester: raw.tester,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_manifest() {
        let m = render("name: example.com/name:1").unwrap();
        assert_eq!(m.name_and_version.to_string(), "example.com/name:1");
        assert!(m.aci.app.is_none());
        assert!(m.tester.is_none());
    }

    #[test]
    fn test_app_exec() {
        let m = render("name: example.com/name:2\naci:\n  app:\n    exec:\n      - /bin/bash\n").unwrap();
        let app = m.aci.app.unwrap();
        assert_eq!(app.exec, vec!["/bin/bash".to_string()]);
        assert_eq!(app.user, "0");
    }

    #[test]
    fn test_annotations_keep_order_and_duplicates() {
        let m = render(
            r#"name: example.com/aci-test:3-1
aci:
  app:
    supplementaryGIDs: [42, 43]
  annotations:
    - {name: test, value: test2}
    - {name: test42, value: test43}
    - {name: test, value: again}
"#,
        )
        .unwrap();
        let names: Vec<&str> = m.aci.annotations.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["test", "test42", "test"]);
        assert_eq!(m.aci.app.unwrap().supplementary_gids, vec![42, 43]);
    }

    #[test]
    fn test_missing_name() {
        for template in ["", "aci:\n  dependencies: ['a:1']\n", "name: \"\"\n", "name:\n"] {
            let err = render(template).unwrap_err();
            assert_eq!(err.reason, ManifestErrorReason::MissingName, "{:?}", template);
        }
    }

    #[test]
    fn test_malformed_carries_content() {
        let template = "name: [unclosed";
        let err = render(template).unwrap_err();
        assert_eq!(err.reason, ManifestErrorReason::Malformed);
        assert_eq!(err.content, template);
    }

    #[test]
    fn test_invalid_dependency_is_malformed() {
        let err = render("name: a\naci:\n  dependencies: ['b:']\n").unwrap_err();
        assert_eq!(err.reason, ManifestErrorReason::Malformed);
    }

    #[test]
    fn test_tester_absent_vs_empty() {
        let absent = render("name: a").unwrap();
        assert!(absent.tester.is_none());

        let empty = render("name: a\ntester: {}\n").unwrap();
        let tester = empty.tester.unwrap();
        assert!(tester.builder.dependencies.is_empty());
        assert!(tester.aci.dependencies.is_empty());
    }

    #[test]
    fn test_builder_dependencies_keep_order() {
        let m = render("name: a\nbuilder:\n  image: z:3\n  dependencies: ['x:1', 'y:2']\n").unwrap();
        let deps: Vec<String> = m.builder.dependencies.iter().map(|d| d.to_string()).collect();
        assert_eq!(deps, vec!["x:1", "y:2"]);
        assert_eq!(m.builder.image.unwrap().to_string(), "z:3");
    }

    #[test]
    fn test_isolators_accept_structured_values() {
        let m = render(
            "name: a\naci:\n  app:\n    isolators:\n      - name: os/linux/capabilities-retain-set\n        value: {set: [CAP_NET_ADMIN]}\n",
        )
        .unwrap();
        let iso = &m.aci.app.unwrap().isolators[0];
        assert_eq!(iso.value["set"][0], "CAP_NET_ADMIN");
    }
}
