//! Sliding-window search for known blocks.
//!
//! The scan rolls a [`RollingHash`] across the buffer one byte at a time and
//! asks a [`ChecksumIndex`] whether each window's checksum is known. A weak hit
//! is handed to a [`Verifier`] which decides whether the window really is a
//! known block. Everything scanned past without a confirmed match is
//! accumulated as literal bytes.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;

use crate::error::{BoxError, Error, Result};
use crate::rolling_hash::{ChecksumState, RollingHash};

/// Membership test against the set of known checksums.
pub trait ChecksumIndex {
    fn contains(&self, checksum: u64) -> bool;
}

/// Outcome of verifying a weak match.
#[derive(Debug)]
pub enum MatchResult<T = ()> {
    /// The window is a known block; `T` identifies which one.
    Confirmed(T),
    /// Checksum collision, the bytes differ. The scan carries on.
    Rejected,
    /// Verification itself failed. The scan stops and reports it.
    Error(BoxError),
}

/// Strong verification of a weak match.
pub trait Verifier {
    type Block;

    /// Check whether `buffer[start..end]`, whose checksum is `checksum`, is a known block.
    fn verify(&self, buffer: &[u8], start: usize, end: usize, checksum: u64)
        -> MatchResult<Self::Block>;
}

impl<F> ChecksumIndex for F
where
    F: Fn(u64) -> bool,
{
    fn contains(&self, checksum: u64) -> bool {
        self(checksum)
    }
}

impl<S: BuildHasher> ChecksumIndex for HashSet<u64, S> {
    fn contains(&self, checksum: u64) -> bool {
        HashSet::contains(self, &checksum)
    }
}

impl<V, S: BuildHasher> ChecksumIndex for HashMap<u64, V, S> {
    fn contains(&self, checksum: u64) -> bool {
        self.contains_key(&checksum)
    }
}

impl ChecksumIndex for BTreeSet<u64> {
    fn contains(&self, checksum: u64) -> bool {
        BTreeSet::contains(self, &checksum)
    }
}

impl<F, T> Verifier for F
where
    F: Fn(&[u8], usize, usize, u64) -> MatchResult<T>,
{
    type Block = T;

    fn verify(&self, buffer: &[u8], start: usize, end: usize, checksum: u64) -> MatchResult<T> {
        self(buffer, start, end, checksum)
    }
}

/// Checksum of the last window a search looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChecksum {
    pub start: usize,
    pub checksum: u64,
}

#[derive(Debug)]
pub enum SearchOutcome<T = ()> {
    Matched {
        range_start: usize,
        range_end: usize,
        /// Bytes before `range_start` that did not match anything.
        literal: Vec<u8>,
        checksum: u64,
        block: T,
    },
    NotFound {
        /// The whole unmatched buffer.
        literal: Vec<u8>,
        /// `None` when the buffer is shorter than one block.
        last_window: Option<WindowChecksum>,
    },
}

impl<T> SearchOutcome<T> {
    pub fn is_match(&self) -> bool {
        matches!(self, SearchOutcome::Matched { .. })
    }

    pub fn literal(&self) -> &[u8] {
        match self {
            SearchOutcome::Matched { literal, .. } | SearchOutcome::NotFound { literal, .. } => {
                literal
            }
        }
    }
}

/// Search configuration. Construct with [`Searcher::new`], which rejects a zero block size.
#[derive(Debug, Clone)]
pub struct Searcher {
    block_size: usize,
    seed: ChecksumState,
    require_window: bool,
}

impl Searcher {
    pub fn new(block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::config("block size must be greater than zero"));
        }
        Ok(Self {
            block_size,
            seed: ChecksumState::DEFAULT,
            require_window: false,
        })
    }

    /// Starting state used for every window checksum. Must match the state
    /// the index's checksums were computed from.
    pub fn seed(mut self, seed: ChecksumState) -> Self {
        self.seed = seed;
        self
    }

    /// Treat a buffer shorter than one block as a configuration error.
    pub fn require_window(mut self, required: bool) -> Self {
        self.require_window = required;
        self
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Scan `buffer` for the first window that `index` knows and `verifier` confirms.
    pub fn search<I, V>(
        &self,
        buffer: &[u8],
        index: &I,
        verifier: &V,
    ) -> Result<SearchOutcome<V::Block>>
    where
        I: ChecksumIndex + ?Sized,
        V: Verifier + ?Sized,
    {
        let block_size = self.block_size;

        if buffer.len() < block_size {
            if self.require_window {
                return Err(Error::config(format!(
                    "buffer of {} bytes is shorter than block size {}",
                    buffer.len(),
                    block_size
                )));
            }
            return Ok(SearchOutcome::NotFound {
                literal: buffer.to_vec(),
                last_window: None,
            });
        }

        tracing::trace!(len = buffer.len(), block_size, "Starting block search");

        let last_start = buffer.len() - block_size;
        let mut rolling = RollingHash::with_seed(self.seed);
        rolling.init(&buffer[..block_size]);

        let mut literal: Vec<u8> = Vec::new();
        let mut pos: usize = 0;

        loop {
            let digest = rolling.digest();
            let window_end = pos + block_size;

            if index.contains(digest) {
                match verifier.verify(buffer, pos, window_end, digest) {
                    MatchResult::Confirmed(block) => {
                        return Ok(SearchOutcome::Matched {
                            range_start: pos,
                            range_end: window_end,
                            literal,
                            checksum: digest,
                            block,
                        });
                    }
                    MatchResult::Rejected => {
                        tracing::trace!(pos, checksum = digest, "Weak match rejected");
                    }
                    MatchResult::Error(source) => {
                        return Err(Error::Collaborator {
                            start: pos,
                            end: window_end,
                            checksum: digest,
                            source,
                        });
                    }
                }
            }

            if pos == last_start {
                break;
            }

            literal.push(buffer[pos]);
            pos += 1;
            rolling.rotate(buffer[pos - 1], buffer[pos + block_size - 1]);
        }

        // The final window never matched either
        literal.extend_from_slice(&buffer[pos..]);

        Ok(SearchOutcome::NotFound {
            literal,
            last_window: Some(WindowChecksum {
                start: last_start,
                checksum: rolling.digest(),
            }),
        })
    }
}

/// Search `buffer` with default options. See [`Searcher::search`].
pub fn search<I, V>(
    buffer: &[u8],
    block_size: usize,
    index: &I,
    verifier: &V,
) -> Result<SearchOutcome<V::Block>>
where
    I: ChecksumIndex + ?Sized,
    V: Verifier + ?Sized,
{
    Searcher::new(block_size)?.search(buffer, index, verifier)
}
