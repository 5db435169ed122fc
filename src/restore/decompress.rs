// pgrestore-sync/src/restore/decompress.rs
use anyhow::{Context, anyhow};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{RestoreError, Result};

const GZIP_SUFFIX: &str = "gz";

/// `dump.sql.gz` -> `dump.sql`. `None` when the path has no `.gz` suffix.
pub fn decompressed_path(compressed: &Path) -> Option<PathBuf> {
    match compressed.extension() {
        Some(ext) if ext == GZIP_SUFFIX && compressed.file_stem().is_some() => {
            Some(compressed.with_extension(""))
        }
        _ => None,
    }
}

/// Streams a gzip artifact to the path with its suffix stripped.
///
/// On failure the output file may be partially written and must not be
/// executed.
pub async fn decompress_artifact(compressed: &Path) -> Result<PathBuf> {
    let compressed = compressed.to_path_buf();
    let decompression_error = |path: &Path, source: anyhow::Error| RestoreError::Decompression {
        path: path.to_path_buf(),
        source,
    };

    let output = decompressed_path(&compressed).ok_or_else(|| {
        decompression_error(
            &compressed,
            anyhow!("artifact has no .{} suffix to strip", GZIP_SUFFIX),
        )
    })?;

    info!(
        path = %compressed.display(),
        output = %output.display(),
        "Decompressing artifact"
    );

    let (input, target) = (compressed.clone(), output.clone());
    let bytes = tokio::task::spawn_blocking(move || gunzip_file(&input, &target))
        .await
        .map_err(|e| decompression_error(&compressed, anyhow!(e).context("decompression task panicked")))?
        .map_err(|e| decompression_error(&compressed, e))?;

    info!(output = %output.display(), bytes, "Artifact decompressed");
    Ok(output)
}

fn gunzip_file(input: &Path, output: &Path) -> anyhow::Result<u64> {
    let input_file = File::open(input)
        .with_context(|| format!("Failed to open compressed artifact: {}", input.display()))?;
    // pigz and concatenated dumps carry several members.
    let mut decoder = MultiGzDecoder::new(BufReader::new(input_file));

    let output_file = File::create(output)
        .with_context(|| format!("Failed to create decompressed file: {}", output.display()))?;
    let mut writer = BufWriter::new(output_file);

    let bytes = io::copy(&mut decoder, &mut writer)
        .with_context(|| format!("Malformed gzip data in {}", input.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush decompressed file: {}", output.display()))?;
    Ok(bytes)
}
