use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::Path;

use crate::index::BlockIndex;
use crate::store_format::{self, IndexSummary, INDEX_MAGIC};
use crate::util::{self, FileData};

/// Build a block index over every file under `reference` and write it to `output`.
/// Uses Tokio to keep the walk off the async runtime and Rayon for parallel loading/hashing.
pub async fn create_index(reference: &Path, output: &Path, block_size: usize) -> Result<IndexSummary> {
    // Stage 1: Walk the reference tree
    let reference_owned = reference.to_path_buf();
    let sources =
        tokio::task::spawn_blocking(move || util::collect_sources(&reference_owned)).await??;

    tracing::info!(
        reference = %reference.display(),
        files = sources.len(),
        block_size,
        "Indexing reference data"
    );

    // Stage 2: Map every source and compute block signatures
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<IndexSummary> {
        let loaded: Vec<(String, FileData)> = sources
            .par_iter()
            .map(|source| -> Result<(String, FileData)> {
                Ok((
                    source.relative_path.clone(),
                    util::load_file(&source.full_path)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let views: Vec<(String, &[u8])> = loaded
            .iter()
            .map(|(name, data)| (name.clone(), &data[..]))
            .collect();

        let index = BlockIndex::build(block_size, &views).context("Failed to build block index")?;

        // Stage 3: Serialize, compress, write
        store_format::write_framed(&output, INDEX_MAGIC, &index.to_manifest())?;

        Ok(IndexSummary {
            sources: index.sources().len(),
            blocks: index.blocks().len(),
            bytes_indexed: index.sources().iter().map(|s| s.size).sum(),
        })
    })
    .await?
}
