/// Error taxonomy and context propagation
#[cfg(test)]
mod tests {
    use acibuild::error::{is_fatal, Error, ErrorFieldExt, ErrorKind, Fields, Result, ResultExt};
    use acibuild::manifest::{render, ManifestErrorReason};

    #[test]
    fn test_missing_name_is_manifest_error() {
        let err = render("aci:\n  dependencies: []\n").unwrap_err();
        assert_eq!(err.reason, ManifestErrorReason::MissingName);

        let err: Error = err.into();
        assert_eq!(err.kind(), ErrorKind::Manifest);
        assert!(err.field("content").unwrap().contains("dependencies"));
    }

    #[test]
    fn test_malformed_template_keeps_text() {
        let template = "name: [unterminated";
        let err = render(template).unwrap_err();
        assert_eq!(err.reason, ManifestErrorReason::Malformed);
        assert_eq!(err.content, template);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_only_extraction_is_downgraded() {
        let kinds = [
            ErrorKind::Manifest,
            ErrorKind::Filesystem,
            ErrorKind::DependencyCompatibility,
            ErrorKind::Runtime,
            ErrorKind::Invocation,
            ErrorKind::Archive,
            ErrorKind::VersionMarker,
            ErrorKind::Signing,
            ErrorKind::Publish,
            ErrorKind::NoTests,
            ErrorKind::Config,
        ];
        for kind in kinds {
            assert!(is_fatal(&Error::new(kind, "boom")), "{} should be fatal", kind);
        }
        assert!(!is_fatal(&Error::new(ErrorKind::Extraction, "boom")));
    }

    #[test]
    fn test_context_accumulates_across_layers() {
        fn write_marker() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "read-only filesystem"))
                .err_ctx(ErrorKind::VersionMarker, "Failed to write version file in target")
                .field("path", "/t/version")
        }

        let build_fields = Fields::new().with("aci", "example.com/app:1").with("path", "/src");
        let err = write_marker()
            .field("stage", "extracted")
            .fields(&build_fields)
            .unwrap_err();

        let keys: Vec<&str> = err.fields().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["path", "stage", "aci", "path"]);
        assert_eq!(err.field("path"), Some("/t/version"));

        let chain: anyhow::Error = err.into();
        let rendered = format!("{:?}", chain);
        assert!(rendered.contains("Failed to write version file in target"));
        assert!(rendered.contains("read-only filesystem"));
    }
}
