use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image identity of the form `name` or `name:version`.
///
/// The version separator is the last `:` after the last `/`, so a registry port
/// (`host:5000/app`) is never taken for a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FullyQualifiedName {
    name: String,
    version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("image name is empty")]
    Empty,
    #[error("image name '{0}' has an empty version")]
    EmptyVersion(String),
    #[error("image name '{0}' contains whitespace")]
    Whitespace(String),
}

impl FullyQualifiedName {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version: version.filter(|v| !v.is_empty()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Last path segment of the name, used to derive work directories
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Same image under a prefixed name, version dropped
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self::new(format!("{}{}", prefix, self.name), None)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl FromStr for FullyQualifiedName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(NameError::Empty);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(NameError::Whitespace(s.to_string()));
        }

        let path_end = s.rfind('/').map(|i| i + 1).unwrap_or(0);
        match s[path_end..].rfind(':') {
            Some(idx) => {
                let split = path_end + idx;
                let (name, version) = (&s[..split], &s[split + 1..]);
                if name.is_empty() {
                    return Err(NameError::Empty);
                }
                if version.is_empty() {
                    return Err(NameError::EmptyVersion(s.to_string()));
                }
                Ok(Self::new(name, Some(version.to_string())))
            }
            None => Ok(Self::new(s, None)),
        }
    }
}

impl TryFrom<String> for FullyQualifiedName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FullyQualifiedName> for String {
    fn from(value: FullyQualifiedName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for FullyQualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name_only() {
        let n: FullyQualifiedName = "example.com/app".parse().unwrap();
        assert_eq!(n.name(), "example.com/app");
        assert_eq!(n.version(), None);
        assert_eq!(n.short_name(), "app");
    }

    #[test]
    fn test_parse_name_and_version() {
        let n: FullyQualifiedName = "example.com/aci-test:3-1".parse().unwrap();
        assert_eq!(n.name(), "example.com/aci-test");
        assert_eq!(n.version(), Some("3-1"));
        assert_eq!(n.to_string(), "example.com/aci-test:3-1");
    }

    #[test]
    fn test_registry_port_is_not_a_version() {
        let n: FullyQualifiedName = "registry:5000/team/app".parse().unwrap();
        assert_eq!(n.name(), "registry:5000/team/app");
        assert_eq!(n.version(), None);

        let n: FullyQualifiedName = "registry:5000/team/app:2.1".parse().unwrap();
        assert_eq!(n.name(), "registry:5000/team/app");
        assert_eq!(n.version(), Some("2.1"));
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!("".parse::<FullyQualifiedName>(), Err(NameError::Empty));
        assert!(matches!(
            "app:".parse::<FullyQualifiedName>(),
            Err(NameError::EmptyVersion(_))
        ));
        assert!(matches!(
            "my app".parse::<FullyQualifiedName>(),
            Err(NameError::Whitespace(_))
        ));
    }

    #[test]
    fn test_prefixed_drops_version() {
        let n: FullyQualifiedName = "example.com/app:1".parse().unwrap();
        assert_eq!(n.prefixed("builder/").to_string(), "builder/example.com/app");
    }
}
