use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::path::Path;

use crate::apply::{self, apply_segments, segment_len};
use crate::dedup::Segment;
use crate::index::{fingerprint, SourceEntry};
use crate::store_format::{self, DeltaManifest, RestoreSummary, DELTA_MAGIC};
use crate::util::{self, FileData};

/// Rebuild the file described by the delta at `delta_path` from the reference
/// data under `reference` and write it to `output`.
pub async fn restore_file(reference: &Path, delta_path: &Path, output: &Path) -> Result<RestoreSummary> {
    let reference = reference.to_path_buf();
    let delta_path = delta_path.to_path_buf();
    let output = output.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<RestoreSummary> {
        let manifest: DeltaManifest = store_format::read_framed(&delta_path, DELTA_MAGIC)?;
        store_format::check_version(manifest.version)?;

        if fingerprint(manifest.block_size, &manifest.sources) != manifest.index_hash {
            bail!("Delta file {} has an inconsistent source list", delta_path.display());
        }

        let covered = apply::output_len(&manifest.segments)
            .with_context(|| format!("Corrupt delta file: {}", delta_path.display()))?;
        if covered != manifest.output_len {
            bail!(
                "Delta segments cover {} bytes, expected {}",
                covered,
                manifest.output_len
            );
        }

        let references = load_references(&reference, &manifest.sources, true)?;
        let views: Vec<&[u8]> = references.iter().map(|data| &data[..]).collect();

        let data = apply_segments(&views, &manifest.segments)
            .with_context(|| format!("Failed to apply delta: {}", delta_path.display()))?;

        if util::hash_bytes(&data) != manifest.output_hash {
            bail!("Hash mismatch after restoring: {}", output.display());
        }

        std::fs::write(&output, &data)
            .with_context(|| format!("Failed to write restored file: {}", output.display()))?;

        let (bytes_copied, bytes_inserted) =
            manifest
                .segments
                .iter()
                .fold((0u64, 0u64), |(copied, inserted), segment| match segment {
                    Segment::Copy { .. } => (copied + segment_len(segment), inserted),
                    Segment::Insert { .. } => (copied, inserted + segment_len(segment)),
                });

        tracing::info!(
            output = %output.display(),
            len = data.len(),
            "Restored file"
        );

        Ok(RestoreSummary {
            output_len: data.len() as u64,
            bytes_copied,
            bytes_inserted,
        })
    })
    .await?
}

/// Map the reference files recorded in `sources`, in order.
/// With `verify_hashes`, each file must still match its recorded BLAKE3 hash.
pub fn load_references(root: &Path, sources: &[SourceEntry], verify_hashes: bool) -> Result<Vec<FileData>> {
    sources
        .par_iter()
        .map(|source| -> Result<FileData> {
            let path = util::resolve_source(root, &source.name);
            let data = util::load_file(&path)?;
            if data.len() as u64 != source.size {
                bail!(
                    "Reference {} changed size: {} bytes, index recorded {}",
                    path.display(),
                    data.len(),
                    source.size
                );
            }
            if verify_hashes && util::hash_bytes(&data) != source.blake3_hash {
                bail!("Hash mismatch for reference file: {}", path.display());
            }
            Ok(data)
        })
        .collect()
}
