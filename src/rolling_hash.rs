/// 64-bit Adler-style rolling checksum for block matching.
///
/// Two 32-bit lanes (a, b) reduced modulo the largest prime below 2^32,
/// combined into a 64-bit key as `(b << 32) | a`.
/// Supports O(1) sliding window updates: remove oldest byte, add new byte.
pub const MOD: u64 = 4_294_967_291;

/// The (a, b) lane pair. Both lanes are always in `[0, MOD)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChecksumState {
    pub a: u32,
    pub b: u32,
}

impl ChecksumState {
    /// Starting state for a fresh checksum: `a = 1, b = 0`.
    pub const DEFAULT: ChecksumState = ChecksumState { a: 1, b: 0 };

    /// Build a state from arbitrary lane values, reducing them into range.
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            a: (a % MOD) as u32,
            b: (b % MOD) as u32,
        }
    }

    /// Combined 64-bit key. Opaque: only compare it, never do arithmetic on it.
    pub fn value(&self) -> u64 {
        ((self.b as u64) << 32) | self.a as u64
    }
}

impl Default for ChecksumState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone)]
pub struct RollingHash {
    a: u64,
    b: u64,
    seed_a: u64,
    seed_b: u64,
    // window length reduced mod MOD
    window_size: u64,
}

impl RollingHash {
    pub fn new() -> Self {
        Self::with_seed(ChecksumState::DEFAULT)
    }

    /// Start from a caller-supplied state instead of `(1, 0)`, e.g. to resume a roll sequence.
    /// Lanes at or above `MOD` are reduced first.
    pub fn with_seed(seed: ChecksumState) -> Self {
        let seed_a = seed.a as u64 % MOD;
        let seed_b = seed.b as u64 % MOD;
        Self {
            a: seed_a,
            b: seed_b,
            seed_a,
            seed_b,
            window_size: 0,
        }
    }

    /// Compute hash over an initial block of data, starting over from the seed.
    pub fn init(&mut self, data: &[u8]) {
        self.window_size = data.len() as u64 % MOD;
        let mut a = self.seed_a;
        let mut b = self.seed_b;
        for &byte in data {
            a += byte as u64;
            if a >= MOD {
                a -= MOD;
            }
            b += a;
            if b >= MOD {
                b -= MOD;
            }
        }
        self.a = a;
        self.b = b;
    }

    /// Slide the window: remove `old_byte` from front, add `new_byte` at back.
    pub fn rotate(&mut self, old_byte: u8, new_byte: u8) {
        let old = old_byte as u64;
        let new = new_byte as u64;

        self.a = (self.a + MOD - old + new) % MOD;
        // old byte sat in every one of the window's partial sums, the seed's
        // `a` term drops out once and the new partial sum comes in.
        let removed = old * self.window_size % MOD;
        self.b = (self.b + 2 * MOD - removed - self.seed_a + self.a) % MOD;
    }

    pub fn state(&self) -> ChecksumState {
        ChecksumState {
            a: self.a as u32,
            b: self.b as u32,
        }
    }

    pub fn digest(&self) -> u64 {
        self.state().value()
    }
}

impl Default for RollingHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-range checksum of `window` from the default `(1, 0)` state.
pub fn checksum(window: &[u8]) -> ChecksumState {
    let mut rolling = RollingHash::new();
    rolling.init(window);
    rolling.state()
}

/// Update `state` (computed over a `block_size` window from the default seed)
/// for the window shifted by one byte.
pub fn roll(state: ChecksumState, removed: u8, added: u8, block_size: usize) -> ChecksumState {
    let mut rolling = RollingHash {
        a: state.a as u64 % MOD,
        b: state.b as u64 % MOD,
        seed_a: ChecksumState::DEFAULT.a as u64,
        seed_b: ChecksumState::DEFAULT.b as u64,
        window_size: block_size as u64 % MOD,
    };
    rolling.rotate(removed, added);
    rolling.state()
}
