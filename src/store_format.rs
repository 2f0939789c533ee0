use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dedup::Segment;
use crate::index::{BlockSignature, SourceEntry};
use crate::util;

pub const INDEX_MAGIC: &[u8; 8] = b"BDXIDX01";
pub const DELTA_MAGIC: &[u8; 8] = b"BDXDLT01";
pub const FORMAT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub block_size: u64,
    pub sources: Vec<SourceEntry>,
    pub blocks: Vec<BlockSignature>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeltaManifest {
    pub version: u32,
    pub block_size: u64,
    /// Fingerprint of the index the delta was computed against
    pub index_hash: [u8; 32],
    /// Reference sources, in the order `Segment::Copy::source` indexes them
    pub sources: Vec<SourceEntry>,
    pub output_len: u64,
    pub output_hash: [u8; 32],
    pub segments: Vec<Segment>,
}

pub struct IndexSummary {
    pub sources: usize,
    pub blocks: usize,
    pub bytes_indexed: u64,
}

pub struct ScanSummary {
    pub input_len: u64,
    pub delta_len: u64,
    pub bytes_reused: u64,
    pub bytes_literal: u64,
    pub blocks_matched: usize,
    pub segments: usize,
}

#[derive(Debug)]
pub struct RestoreSummary {
    pub output_len: u64,
    pub bytes_copied: u64,
    pub bytes_inserted: u64,
}

/// Serialize, compress and write `value` behind `magic`.
pub fn write_framed<T: Serialize>(path: &Path, magic: &[u8; 8], value: &T) -> Result<u64> {
    let encoded = bincode::serialize(value).context("Failed to serialize manifest")?;
    let compressed =
        zstd::bulk::compress(&encoded, ZSTD_LEVEL).context("Failed to compress manifest")?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    file.write_all(magic)?;
    file.write_all(&compressed)?;
    file.flush()?;

    Ok((magic.len() + compressed.len()) as u64)
}

/// mmap `path`, check `magic`, then stream-decompress into bincode.
pub fn read_framed<T: DeserializeOwned>(path: &Path, magic: &[u8; 8]) -> Result<T> {
    let raw = util::mmap_file(path)?;

    if raw.len() < magic.len() || &raw[..magic.len()] != magic {
        bail!(
            "Invalid file {}: expected {} header",
            path.display(),
            String::from_utf8_lossy(magic)
        );
    }

    let decoder =
        zstd::Decoder::new(&raw[magic.len()..]).context("Failed to create zstd decoder")?;
    bincode::deserialize_from(decoder)
        .with_context(|| format!("Failed to deserialize {}", path.display()))
}

pub fn check_version(version: u32) -> Result<()> {
    if version != FORMAT_VERSION {
        bail!(
            "Unsupported format version: {} (expected {})",
            version,
            FORMAT_VERSION
        );
    }
    Ok(())
}
