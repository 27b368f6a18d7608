/// Packaging, compression and manifest extraction on real directories
#[cfg(test)]
mod tests {
    use acibuild::archive::{compress, extract_manifest, package_directory};
    use acibuild::config::CompressionConfig;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn staged_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("manifest"), br#"{"name":"example.com/app"}"#).unwrap();
        fs::create_dir_all(dir.path().join("rootfs/dir")).unwrap();
        fs::write(dir.path().join("rootfs/a"), "a").unwrap();
        fs::write(dir.path().join("rootfs/dir/b"), "b").unwrap();
        fs::write(dir.path().join("unrelated"), "not packaged").unwrap();
        dir
    }

    #[test]
    fn test_package_contains_exactly_manifest_and_rootfs_files() {
        let dir = staged_dir();
        let aci = package_directory(dir.path()).unwrap();
        assert_eq!(aci, dir.path().join("image.aci"));

        let mut archive = tar::Archive::new(fs::File::open(&aci).unwrap());
        let files: BTreeSet<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.header().entry_type().is_file())
            .map(|e| e.path().unwrap().to_string_lossy().into_owned())
            .collect();

        let expected: BTreeSet<String> = ["manifest", "rootfs/a", "rootfs/dir/b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(files, expected);
    }

    #[test]
    fn test_compress_twice_does_no_work() {
        let dir = staged_dir();
        let aci = package_directory(dir.path()).unwrap();
        let target = dir.path().join("image.gz.aci");

        let first = compress(&aci, &target, CompressionConfig::default()).unwrap();
        let modified = fs::metadata(&first).unwrap().modified().unwrap();
        let content = fs::read(&first).unwrap();

        let second = compress(&aci, &target, CompressionConfig::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::metadata(&second).unwrap().modified().unwrap(), modified);
        assert_eq!(fs::read(&second).unwrap(), content);
    }

    #[test]
    fn test_manifest_read_back_from_both_forms() {
        let dir = staged_dir();
        let aci = package_directory(dir.path()).unwrap();
        let gz = compress(
            &aci,
            &dir.path().join("image.gz.aci"),
            CompressionConfig {
                block_size: 64,
                concurrency: 4,
            },
        )
        .unwrap();

        let expected = br#"{"name":"example.com/app"}"#.to_vec();
        assert_eq!(extract_manifest(&aci).unwrap(), expected);
        assert_eq!(extract_manifest(&gz).unwrap(), expected);
    }
}
