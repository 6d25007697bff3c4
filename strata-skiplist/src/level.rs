//! Random level generation.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use strata_pool::MAX_LEVEL;

/// The seed used by [`LevelGenerator::default`].
pub const DEFAULT_SEED: u64 = 0x12b9b0a1;

const GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// The sentinel marking a freshly refilled bit buffer. Below it sit 31 two-bit groups.
const SENTINEL: u64 = 1 << 62;

/// Draws node levels with `P(level >= n + 1 | level >= n) = 1/4`.
///
/// Random bits come from a SplitMix64 sequence and are consumed two at a
/// time from a shared buffer. Every zero group raises the level by one, and
/// the first non-zero group stops the draw. The result is capped at
/// [`MAX_LEVEL`].
///
/// The generator is lock-free and can be shared between threads. Both the
/// sequence counter and the bit buffer are atomics updated with
/// compare-and-swap (or `fetch_add`), so every group of bits is handed to
/// exactly one caller. All operations use `Relaxed` ordering: the generator
/// publishes no memory other than its own atomics. Under contention the
/// interleaving of draws between threads, and therefore which thread observes
/// which level, is unspecified. The levels a single-threaded caller observes
/// are fully determined by the seed.
///
/// ```
/// use strata_skiplist::LevelGenerator;
///
/// let a = LevelGenerator::new(7);
/// let b = LevelGenerator::new(7);
/// for _ in 0..100 {
///     assert_eq!(a.random_level(), b.random_level());
/// }
/// ```
pub struct LevelGenerator {
    seed: u64,
    counter: AtomicU64,
    bits: AtomicU64,
}

impl LevelGenerator {
    /// Creates a generator from `seed`.
    pub fn new(seed: u64) -> LevelGenerator {
        LevelGenerator {
            seed,
            counter: AtomicU64::new(seed),
            bits: AtomicU64::new(0),
        }
    }

    /// Returns the seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draws a level in `0..=MAX_LEVEL`.
    pub fn random_level(&self) -> u8 {
        let mut level = 0;
        while level < MAX_LEVEL && self.next_group() == 0 {
            level += 1;
        }
        level
    }

    /// Takes the lowest two bits off the buffer, refilling it first if only
    /// the sentinel is left.
    fn next_group(&self) -> u64 {
        let mut bits = self.bits.load(Ordering::Relaxed);
        loop {
            if bits <= 1 {
                let fresh = (self.next_u64() >> 2) | SENTINEL;
                match self.bits.compare_exchange_weak(
                    bits,
                    fresh,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => bits = fresh,
                    Err(current) => {
                        bits = current;
                        continue;
                    }
                }
            }

            match self.bits.compare_exchange_weak(
                bits,
                bits >> 2,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return bits & 0b11,
                Err(current) => bits = current,
            }
        }
    }

    fn next_u64(&self) -> u64 {
        let mut z = self
            .counter
            .fetch_add(GAMMA, Ordering::Relaxed)
            .wrapping_add(GAMMA);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }
}

impl Default for LevelGenerator {
    fn default() -> LevelGenerator {
        LevelGenerator::new(DEFAULT_SEED)
    }
}

impl Clone for LevelGenerator {
    /// Returns a generator restarted from the same seed.
    fn clone(&self) -> LevelGenerator {
        LevelGenerator::new(self.seed)
    }
}

impl fmt::Debug for LevelGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelGenerator")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}
