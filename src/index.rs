//! Block index over reference data.
//!
//! Each reference source is split into fixed-size blocks:
//! 1. Compute the weak rolling checksum and BLAKE3 strong hash of every full block
//! 2. Build a hash table from weak checksum -> block ids
//! 3. Answer membership for the search, and confirm weak hits by strong hash
//!
//! Only full blocks are indexed. A search window is always exactly one block
//! long, so a shorter tail could never be matched.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::rolling_hash::checksum;
use crate::search::{ChecksumIndex, MatchResult, Verifier};
use crate::store_format::{IndexManifest, FORMAT_VERSION};

/// Reference file (or buffer) the index was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    pub size: u64,
    pub blake3_hash: [u8; 32],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSignature {
    pub checksum: u64,
    pub strong_hash: [u8; 32],
    pub source: u32,
    pub offset: u64,
}

/// Location of a known block inside the reference sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub source: u32,
    pub offset: u64,
    pub length: u64,
}

pub struct BlockIndex {
    block_size: usize,
    sources: Vec<SourceEntry>,
    blocks: Vec<BlockSignature>,
    table: HashMap<u64, Vec<usize>>,
}

impl BlockIndex {
    /// Index `sources` (name, bytes) with the given block size.
    /// Signatures are computed in parallel across and within sources.
    pub fn build(block_size: usize, sources: &[(String, &[u8])]) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::config("block size must be greater than zero"));
        }
        if sources.len() > u32::MAX as usize {
            return Err(Error::config("too many reference sources"));
        }

        let entries: Vec<SourceEntry> = sources
            .par_iter()
            .map(|(name, data)| SourceEntry {
                name: name.clone(),
                size: data.len() as u64,
                blake3_hash: *blake3::hash(data).as_bytes(),
            })
            .collect();

        let blocks: Vec<BlockSignature> = sources
            .par_iter()
            .enumerate()
            .flat_map_iter(|(source_idx, (_, data))| {
                build_signatures(data, block_size, source_idx as u32)
            })
            .collect();

        tracing::debug!(
            sources = entries.len(),
            blocks = blocks.len(),
            block_size,
            "Built block index"
        );

        Ok(Self::from_parts(block_size, entries, blocks))
    }

    /// Rebuild the lookup table from a deserialized manifest.
    pub fn from_manifest(manifest: IndexManifest) -> Result<Self> {
        if manifest.version != FORMAT_VERSION {
            return Err(Error::format(format!(
                "unsupported index version: {} (expected {})",
                manifest.version, FORMAT_VERSION
            )));
        }
        let block_size = usize::try_from(manifest.block_size)
            .map_err(|_| Error::format("block size does not fit in memory"))?;
        if block_size == 0 {
            return Err(Error::format("index has a zero block size"));
        }
        if let Some(bad) = manifest
            .blocks
            .iter()
            .find(|b| b.source as usize >= manifest.sources.len())
        {
            return Err(Error::format(format!(
                "block at offset {} refers to unknown source {}",
                bad.offset, bad.source
            )));
        }
        Ok(Self::from_parts(block_size, manifest.sources, manifest.blocks))
    }

    pub fn to_manifest(&self) -> IndexManifest {
        IndexManifest {
            version: FORMAT_VERSION,
            block_size: self.block_size as u64,
            sources: self.sources.clone(),
            blocks: self.blocks.clone(),
        }
    }

    fn from_parts(block_size: usize, sources: Vec<SourceEntry>, blocks: Vec<BlockSignature>) -> Self {
        let mut table: HashMap<u64, Vec<usize>> = HashMap::with_capacity(blocks.len());
        for (idx, sig) in blocks.iter().enumerate() {
            table.entry(sig.checksum).or_default().push(idx);
        }
        Self {
            block_size,
            sources,
            blocks,
            table,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn sources(&self) -> &[SourceEntry] {
        &self.sources
    }

    pub fn blocks(&self) -> &[BlockSignature] {
        &self.blocks
    }

    /// Block ids sharing the weak checksum `checksum`.
    pub fn candidates(&self, checksum: u64) -> &[usize] {
        self.table.get(&checksum).map(Vec::as_slice).unwrap_or(&[])
    }

    fn block_ref(&self, idx: usize) -> BlockRef {
        let sig = &self.blocks[idx];
        BlockRef {
            source: sig.source,
            offset: sig.offset,
            length: self.block_size as u64,
        }
    }

    /// Identity of the index contents, recorded in delta files so a delta is
    /// only ever restored against the reference set it was computed from.
    pub fn fingerprint(&self) -> [u8; 32] {
        fingerprint(self.block_size as u64, &self.sources)
    }
}

pub fn fingerprint(block_size: u64, sources: &[SourceEntry]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&block_size.to_le_bytes());
    for source in sources {
        hasher.update(&source.size.to_le_bytes());
        hasher.update(&source.blake3_hash);
    }
    *hasher.finalize().as_bytes()
}

fn build_signatures(data: &[u8], block_size: usize, source: u32) -> Vec<BlockSignature> {
    data.par_chunks_exact(block_size)
        .enumerate()
        .map(|(i, block)| BlockSignature {
            checksum: checksum(block).value(),
            strong_hash: *blake3::hash(block).as_bytes(),
            source,
            offset: (i * block_size) as u64,
        })
        .collect()
}

impl ChecksumIndex for BlockIndex {
    fn contains(&self, checksum: u64) -> bool {
        self.table.contains_key(&checksum)
    }
}

/// Confirms a weak hit when the window's BLAKE3 hash equals a candidate block's.
impl Verifier for BlockIndex {
    type Block = BlockRef;

    fn verify(&self, buffer: &[u8], start: usize, end: usize, checksum: u64) -> MatchResult<BlockRef> {
        let window = match window_of(buffer, start, end, self.block_size) {
            Ok(window) => window,
            Err(e) => return MatchResult::Error(e.into()),
        };

        let strong = blake3::hash(window);
        match self
            .candidates(checksum)
            .iter()
            .find(|&&idx| self.blocks[idx].strong_hash == *strong.as_bytes())
        {
            Some(&idx) => MatchResult::Confirmed(self.block_ref(idx)),
            None => MatchResult::Rejected,
        }
    }
}

/// Confirms a weak hit by comparing bytes with the loaded reference sources.
pub struct ExactVerifier<'a> {
    index: &'a BlockIndex,
    sources: Vec<&'a [u8]>,
}

impl<'a> ExactVerifier<'a> {
    /// `sources` must be in the same order as `index.sources()`.
    pub fn new(index: &'a BlockIndex, sources: Vec<&'a [u8]>) -> Self {
        Self { index, sources }
    }
}

impl Verifier for ExactVerifier<'_> {
    type Block = BlockRef;

    fn verify(&self, buffer: &[u8], start: usize, end: usize, checksum: u64) -> MatchResult<BlockRef> {
        let window = match window_of(buffer, start, end, self.index.block_size) {
            Ok(window) => window,
            Err(e) => return MatchResult::Error(e.into()),
        };

        for &idx in self.index.candidates(checksum) {
            let block = self.index.block_ref(idx);
            let Some(source) = self.sources.get(block.source as usize) else {
                return MatchResult::Error(
                    format!("reference source {} is not loaded", block.source).into(),
                );
            };
            let offset = block.offset as usize;
            let Some(reference) = offset
                .checked_add(window.len())
                .and_then(|end| source.get(offset..end))
            else {
                return MatchResult::Error(
                    format!(
                        "block at offset {} lies beyond reference source {} ({} bytes)",
                        offset,
                        block.source,
                        source.len()
                    )
                    .into(),
                );
            };
            if reference == window {
                return MatchResult::Confirmed(block);
            }
        }
        MatchResult::Rejected
    }
}

fn window_of(buffer: &[u8], start: usize, end: usize, block_size: usize) -> Result<&[u8]> {
    if end < start || end - start != block_size {
        return Err(Error::config(format!(
            "window {}..{} does not match index block size {}",
            start, end, block_size
        )));
    }
    buffer
        .get(start..end)
        .ok_or_else(|| Error::config(format!("window {}..{} is outside the buffer", start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{search, SearchOutcome};

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_only_full_blocks_indexed() {
        let data = patterned(100);
        let index = BlockIndex::build(32, &[("a".to_string(), &data[..])]).unwrap();
        assert_eq!(index.blocks().len(), 3);
        assert_eq!(index.sources()[0].size, 100);
        assert_eq!(index.blocks()[2].offset, 64);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let data = patterned(10);
        let err = BlockIndex::build(0, &[("a".to_string(), &data[..])]).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_search_finds_shifted_block() {
        let reference = patterned(256);
        let index = BlockIndex::build(64, &[("ref".to_string(), &reference[..])]).unwrap();

        let mut input = b"prefix!".to_vec();
        input.extend_from_slice(&reference[128..192]);
        let outcome = search(&input, 64, &index, &index).unwrap();
        match outcome {
            SearchOutcome::Matched {
                range_start,
                literal,
                block,
                ..
            } => {
                assert_eq!(range_start, 7);
                assert_eq!(literal, b"prefix!");
                assert_eq!(
                    block,
                    BlockRef {
                        source: 0,
                        offset: 128,
                        length: 64
                    }
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_strong_hash_rejects_forged_weak_match() {
        let reference = patterned(64);
        let index = BlockIndex::build(64, &[("ref".to_string(), &reference[..])]).unwrap();
        let other = vec![0u8; 64];
        let weak = index.blocks()[0].checksum;
        // Claim the foreign window has the reference checksum
        match index.verify(&other, 0, 64, weak) {
            MatchResult::Rejected => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wrong_window_length_is_error() {
        let reference = patterned(64);
        let index = BlockIndex::build(32, &[("ref".to_string(), &reference[..])]).unwrap();
        assert!(matches!(
            index.verify(&reference, 0, 16, 0),
            MatchResult::Error(_)
        ));
    }

    #[test]
    fn test_exact_verifier_reports_missing_source() {
        let reference = patterned(64);
        let index = BlockIndex::build(32, &[("ref".to_string(), &reference[..])]).unwrap();
        let verifier = ExactVerifier::new(&index, vec![]);
        let weak = index.blocks()[0].checksum;
        assert!(matches!(
            verifier.verify(&reference, 0, 32, weak),
            MatchResult::Error(_)
        ));

        let verifier = ExactVerifier::new(&index, vec![&reference[..]]);
        assert!(matches!(
            verifier.verify(&reference, 0, 32, weak),
            MatchResult::Confirmed(BlockRef { offset: 0, .. })
        ));
    }

    #[test]
    fn test_manifest_round_trip_keeps_lookup() {
        let reference = patterned(200);
        let index = BlockIndex::build(50, &[("ref".to_string(), &reference[..])]).unwrap();
        let restored = BlockIndex::from_manifest(index.to_manifest()).unwrap();
        for sig in index.blocks() {
            assert!(restored.contains(sig.checksum));
        }
        assert_eq!(restored.fingerprint(), index.fingerprint());
    }

    #[test]
    fn test_manifest_with_dangling_source_rejected() {
        let reference = patterned(64);
        let index = BlockIndex::build(32, &[("ref".to_string(), &reference[..])]).unwrap();
        let mut manifest = index.to_manifest();
        manifest.blocks[0].source = 9;
        assert!(BlockIndex::from_manifest(manifest).is_err());
    }
}
