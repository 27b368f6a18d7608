use crate::constants::PATH_MANIFEST;
use crate::error::{Error, ErrorFieldExt, ErrorKind, Result, ResultExt};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Read the `manifest` entry of an image archive, gzipped or not.
pub fn extract_manifest(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path)
        .err_ctx(ErrorKind::Extraction, "Failed to open aci")
        .field("path", path.display())?;
    extract_manifest_from_reader(BufReader::new(file)).field("path", path.display())
}

pub fn extract_manifest_from_reader<R: BufRead>(mut reader: R) -> Result<Vec<u8>> {
    let gzipped = reader
        .fill_buf()
        .err_ctx(ErrorKind::Extraction, "Failed to read aci")?
        .starts_with(&GZIP_MAGIC);

    if gzipped {
        find_manifest(MultiGzDecoder::new(reader))
    } else {
        find_manifest(reader)
    }
}

fn find_manifest<R: Read>(reader: R) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .err_ctx(ErrorKind::Extraction, "Failed to read aci entries")?;

    for entry in entries {
        let mut entry = entry.err_ctx(ErrorKind::Extraction, "Corrupted aci entry")?;
        let is_manifest = entry
            .path()
            .map(|p| p.as_os_str() == PATH_MANIFEST || p.as_os_str() == "./manifest")
            .unwrap_or(false);
        if is_manifest {
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .err_ctx(ErrorKind::Extraction, "Failed to read manifest entry")?;
            return Ok(content);
        }
    }
    Err(Error::new(ErrorKind::Extraction, "No manifest found in aci"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tar_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_plain_archive() {
        let tar = tar_with(&[("rootfs/a", b"a"), ("manifest", b"{\"name\":\"x\"}")]);
        let manifest = extract_manifest_from_reader(&tar[..]).unwrap();
        assert_eq!(manifest, b"{\"name\":\"x\"}");
    }

    #[test]
    fn test_gzipped_archive() {
        let tar = tar_with(&[("manifest", b"{}")]);
        let mut gz = GzEncoder::new(Vec::new(), Compression::fast());
        std::io::Write::write_all(&mut gz, &tar).unwrap();
        let gz = gz.finish().unwrap();

        assert_eq!(extract_manifest_from_reader(&gz[..]).unwrap(), b"{}");
    }

    #[test]
    fn test_missing_manifest() {
        let tar = tar_with(&[("rootfs/a", b"a")]);
        let err = extract_manifest_from_reader(&tar[..]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }
}
