use anyhow::{Context, Result};
use std::path::Path;

use crate::dedup::{self, Segment};
use crate::index::{BlockIndex, ExactVerifier};
use crate::restore::load_references;
use crate::store_format::{
    self, DeltaManifest, IndexManifest, ScanSummary, DELTA_MAGIC, FORMAT_VERSION, INDEX_MAGIC,
};
use crate::util;

/// Deduplicate `input` against the index at `index_path` and write the delta to `output`.
///
/// With `exact_reference`, weak hits are confirmed by comparing bytes against
/// the reference tree instead of by strong hash.
pub async fn scan_file(
    index_path: &Path,
    input: &Path,
    output: &Path,
    exact_reference: Option<&Path>,
) -> Result<ScanSummary> {
    // Stage 1: Load the index and map the input concurrently
    let index_owned = index_path.to_path_buf();
    let input_owned = input.to_path_buf();

    let (index, input_data) = tokio::try_join!(
        tokio::task::spawn_blocking(move || -> Result<BlockIndex> {
            let manifest: IndexManifest = store_format::read_framed(&index_owned, INDEX_MAGIC)?;
            store_format::check_version(manifest.version)?;
            BlockIndex::from_manifest(manifest)
                .with_context(|| format!("Invalid index: {}", index_owned.display()))
        }),
        tokio::task::spawn_blocking(move || util::load_file(&input_owned)),
    )?;

    let index = index?;
    let input_data = input_data?;

    tracing::info!(
        input = %input.display(),
        len = input_data.len(),
        block_size = index.block_size(),
        blocks = index.blocks().len(),
        exact = exact_reference.is_some(),
        "Scanning input for known blocks"
    );

    // Stage 2: Search + encode
    let exact_reference = exact_reference.map(Path::to_path_buf);
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<ScanSummary> {
        let segments: Vec<Segment> = match exact_reference {
            Some(root) => {
                let references = load_references(&root, index.sources(), false)?;
                let views: Vec<&[u8]> = references.iter().map(|data| &data[..]).collect();
                let verifier = ExactVerifier::new(&index, views);
                dedup::deduplicate(&input_data, &index, &verifier)?
            }
            None => dedup::deduplicate(&input_data, &index, &index)?,
        };

        let stats = dedup::summarize(input_data.len(), &segments, index.block_size());

        let manifest = DeltaManifest {
            version: FORMAT_VERSION,
            block_size: index.block_size() as u64,
            index_hash: index.fingerprint(),
            sources: index.sources().to_vec(),
            output_len: input_data.len() as u64,
            output_hash: util::hash_bytes(&input_data),
            segments,
        };

        let delta_len = store_format::write_framed(&output, DELTA_MAGIC, &manifest)?;

        Ok(ScanSummary {
            input_len: stats.input_len,
            delta_len,
            bytes_reused: stats.bytes_reused,
            bytes_literal: stats.bytes_literal,
            blocks_matched: stats.blocks_matched,
            segments: stats.segments,
        })
    })
    .await?
}
