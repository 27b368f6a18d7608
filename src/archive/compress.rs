use crate::config::CompressionConfig;
use crate::error::{ErrorFieldExt, ErrorKind, Result, ResultExt};
use flate2::{Compression, GzBuilder};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Gzip `source` into `target` as independent members compressed in parallel.
///
/// Returns immediately when `target` already exists. The output is a valid multi-member
/// gzip stream; only the first member carries the source file name.
pub fn compress(source: &Path, target: &Path, options: CompressionConfig) -> Result<PathBuf> {
    if target.exists() {
        tracing::debug!(path = %target.display(), "Compressed image already exists");
        return Ok(target.to_path_buf());
    }
    tracing::info!(path = %source.display(), "Gzipping aci");

    let block_size = options.block_size.max(1);
    let concurrency = options.concurrency.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .build()
        .err_ctx(ErrorKind::Archive, "Failed to create compression pool")?;

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut input = File::open(source)
        .err_ctx(ErrorKind::Archive, "Failed to open aci for compression")
        .field("path", source.display())?;

    let tmp = target.with_extension("tmp");
    let mut output = BufWriter::new(
        File::create(&tmp)
            .err_ctx(ErrorKind::Archive, "Failed to create compressed image")
            .field("path", tmp.display())?,
    );

    let mut first = true;
    loop {
        let mut blocks = read_blocks(&mut input, block_size, concurrency)
            .err_ctx(ErrorKind::Archive, "Failed to read aci")
            .field("path", source.display())?;
        if blocks.is_empty() {
            if !first {
                break;
            }
            blocks.push(Vec::new());
        }
        let last_batch = blocks.len() < concurrency;

        let name = first.then_some(file_name.as_str());
        let members: Vec<std::io::Result<Vec<u8>>> = pool.install(|| {
            blocks
                .par_iter()
                .enumerate()
                .map(|(i, block)| gzip_member(block, if i == 0 { name } else { None }))
                .collect()
        });
        for member in members {
            let member = member.err_ctx(ErrorKind::Archive, "Failed to compress block")?;
            output
                .write_all(&member)
                .err_ctx(ErrorKind::Archive, "Failed to write compressed image")
                .field("path", tmp.display())?;
        }

        first = false;
        if last_batch {
            break;
        }
    }

    output
        .into_inner()
        .map_err(|e| e.into_error())
        .and_then(|f| f.sync_all())
        .err_ctx(ErrorKind::Archive, "Failed to flush compressed image")
        .field("path", tmp.display())?;
    std::fs::rename(&tmp, target)
        .err_ctx(ErrorKind::Archive, "Failed to move compressed image in place")
        .field("path", target.display())?;
    Ok(target.to_path_buf())
}

/// Up to `count` blocks; only the last one may be short.
fn read_blocks(input: &mut impl Read, block_size: usize, count: usize) -> std::io::Result<Vec<Vec<u8>>> {
    let mut blocks = Vec::with_capacity(count);
    while blocks.len() < count {
        let mut block = Vec::with_capacity(block_size);
        let read = input.by_ref().take(block_size as u64).read_to_end(&mut block)?;
        if read == 0 {
            break;
        }
        let short = read < block_size;
        blocks.push(block);
        if short {
            break;
        }
    }
    Ok(blocks)
}

fn gzip_member(data: &[u8], file_name: Option<&str>) -> std::io::Result<Vec<u8>> {
    let mut builder = GzBuilder::new();
    if let Some(name) = file_name {
        builder = builder.filename(name);
    }
    let mut encoder = builder.write(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
