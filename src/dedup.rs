use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::{BlockIndex, BlockRef};
use crate::search::{SearchOutcome, Searcher, Verifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    Copy { source: u32, offset: u64, length: u64 },
    Insert { data: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSummary {
    pub input_len: u64,
    pub bytes_reused: u64,
    pub bytes_literal: u64,
    pub blocks_matched: usize,
    pub segments: usize,
}

/// Split `data` into copies of known reference blocks and literal inserts.
///
/// Runs the block search repeatedly, resuming right after each confirmed
/// match, until the input is exhausted. `verifier` decides what counts as a
/// confirmed match (strong hash via the index itself, or exact bytes).
pub fn deduplicate<V>(data: &[u8], index: &BlockIndex, verifier: &V) -> Result<Vec<Segment>>
where
    V: Verifier<Block = BlockRef> + ?Sized,
{
    let searcher = Searcher::new(index.block_size())?;
    let mut segments: Vec<Segment> = Vec::new();
    let mut pos: usize = 0;

    while pos < data.len() {
        match searcher.search(&data[pos..], index, verifier)? {
            SearchOutcome::Matched {
                range_end,
                literal,
                block,
                ..
            } => {
                push_insert(&mut segments, literal);
                push_copy(&mut segments, block);
                pos += range_end;
            }
            SearchOutcome::NotFound { literal, .. } => {
                push_insert(&mut segments, literal);
                break;
            }
        }
    }

    tracing::debug!(
        input_len = data.len(),
        segments = segments.len(),
        "Deduplication finished"
    );

    Ok(segments)
}

fn push_insert(segments: &mut Vec<Segment>, data: Vec<u8>) {
    if !data.is_empty() {
        segments.push(Segment::Insert { data });
    }
}

/// Append a copy, extending the previous one when it continues the same source run.
fn push_copy(segments: &mut Vec<Segment>, block: BlockRef) {
    if let Some(Segment::Copy {
        source,
        offset,
        length,
    }) = segments.last_mut()
    {
        if *source == block.source && *offset + *length == block.offset {
            *length += block.length;
            return;
        }
    }
    segments.push(Segment::Copy {
        source: block.source,
        offset: block.offset,
        length: block.length,
    });
}

pub fn summarize(input_len: usize, segments: &[Segment], block_size: usize) -> DedupSummary {
    let mut summary = DedupSummary {
        input_len: input_len as u64,
        segments: segments.len(),
        ..Default::default()
    };
    for segment in segments {
        match segment {
            Segment::Copy { length, .. } => {
                summary.bytes_reused += length;
                summary.blocks_matched += (*length / block_size as u64) as usize;
            }
            Segment::Insert { data } => summary.bytes_literal += data.len() as u64,
        }
    }
    summary
}
