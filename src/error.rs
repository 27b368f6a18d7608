/// acibuild error types and handling utilities
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reason code carried by every [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed template or missing identity
    Manifest,
    /// Cannot create directories or write staged files
    Filesystem,
    /// A declared dependency cannot be fetched
    DependencyCompatibility,
    /// The isolation runtime refused or failed an operation
    Runtime,
    /// The builder's isolated run exited non-zero
    Invocation,
    /// Packaging or compressing an image failed
    Archive,
    /// Reading back the built image's manifest failed
    Extraction,
    /// Writing the plain-text version marker failed
    VersionMarker,
    Signing,
    Publish,
    /// Tests were required but the manifest declares no tester
    NoTests,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manifest => "manifest",
            Self::Filesystem => "filesystem",
            Self::DependencyCompatibility => "dependency compatibility",
            Self::Runtime => "runtime",
            Self::Invocation => "invocation",
            Self::Archive => "archive",
            Self::Extraction => "extraction",
            Self::VersionMarker => "version marker",
            Self::Signing => "signing",
            Self::Publish => "publish",
            Self::NoTests => "no tests",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Main error type: a reason code, a message, ordered context fields and the causal chain.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    fields: Vec<(String, String)>,
    source: Option<BoxError>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: Vec::new(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Append a context field. Fields keep insertion order and duplicate keys are kept.
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    pub fn with_fields(mut self, fields: &Fields) -> Self {
        self.fields.extend(fields.iter().cloned());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.fields.is_empty() {
            let rendered: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, " [{}]", rendered.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Ordered key/value context attached to logs and errors of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), value.to_string()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&rendered.join(" "))
    }
}

/// Wrap foreign errors into an [`Error`] of a given kind.
pub trait ResultExt<T> {
    fn err_ctx(self, kind: ErrorKind, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BoxError>,
{
    fn err_ctx(self, kind: ErrorKind, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::new(kind, message).with_source(e))
    }
}

/// Add a context field to the error of a crate result.
pub trait ErrorFieldExt<T> {
    fn field(self, key: &str, value: impl ToString) -> Result<T>;
    fn fields(self, fields: &Fields) -> Result<T>;
}

impl<T> ErrorFieldExt<T> for Result<T> {
    fn field(self, key: &str, value: impl ToString) -> Result<T> {
        self.map_err(|e| e.with_field(key, value))
    }

    fn fields(self, fields: &Fields) -> Result<T> {
        self.map_err(|e| e.with_fields(fields))
    }
}

/// Errors of these kinds abort the pipeline; the rest are downgraded to warnings.
pub fn is_fatal(err: &Error) -> bool {
    !matches!(err.kind, ErrorKind::Extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_includes_fields_in_order() {
        let err = Error::new(ErrorKind::Filesystem, "Cannot create target directory")
            .with_field("aci", "example.com/app:1")
            .with_field("path", "/tmp/target");
        assert_eq!(
            err.to_string(),
            "Cannot create target directory [aci=example.com/app:1, path=/tmp/target]"
        );
    }

    #[test]
    fn test_source_chain_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Result<()> = Err(io).err_ctx(ErrorKind::VersionMarker, "Failed to write version");
        let err = err.field("path", "/t/version").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::VersionMarker);
        assert_eq!(err.field("path"), Some("/t/version"));
        assert_eq!(err.source().unwrap().to_string(), "denied");
    }

    #[test]
    fn test_fatal_detection() {
        assert!(is_fatal(&Error::new(ErrorKind::Invocation, "exit 1")));
        assert!(!is_fatal(&Error::new(ErrorKind::Extraction, "no manifest")));
    }

    #[test]
    fn test_error_conversion_to_anyhow() {
        let err = Error::new(ErrorKind::NoTests, "No tests found");
        let anyhow_err: anyhow::Error = err.into();
        assert!(anyhow_err.to_string().contains("No tests"));
    }

    #[test]
    fn test_fields_merge_into_error() {
        let fields = Fields::new().with("aci", "a").with("path", "/p");
        let err = Error::new(ErrorKind::Runtime, "boom").with_fields(&fields);
        assert_eq!(err.fields().len(), 2);
        assert_eq!(fields.to_string(), "aci=a path=/p");
    }
}
