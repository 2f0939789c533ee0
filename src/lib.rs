//! Block-level deduplication built on a 64-bit Adler-style rolling checksum.
//!
//! The core ([`rolling_hash`], [`search`]) is synchronous and does no I/O:
//! compute a window checksum, roll it one byte at a time, and look for windows
//! an external index knows about, with strong verification delegated to a
//! [`search::Verifier`]. [`index`], [`dedup`] and [`apply`] build a concrete
//! deduplicator on top; [`create`], [`scan`] and [`restore`] drive it over files.

pub mod apply;
pub mod create;
pub mod dedup;
pub mod error;
pub mod index;
pub mod restore;
pub mod rolling_hash;
pub mod scan;
pub mod search;
pub mod store_format;
pub mod util;

pub use dedup::{deduplicate, DedupSummary, Segment};
pub use error::{BoxError, Error, Result};
pub use index::{BlockIndex, BlockRef, ExactVerifier};
pub use rolling_hash::{checksum, roll, ChecksumState, RollingHash, MOD};
pub use search::{search, ChecksumIndex, MatchResult, SearchOutcome, Searcher, Verifier, WindowChecksum};
