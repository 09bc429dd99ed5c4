// String-seeded deterministic generator for the starsong pipeline.
//
// The core is xoshiro256++ (Blackman & Vigna, 2019) expanded from a 64-bit
// seed by SplitMix64. Seeds are strings: the control-surface hash, optionally
// joined with a stage name (`"<hash>:finalize"`, `"<hash>:compose:lunar"`).
// `seed_hash` folds a string to 64 bits with FNV-1a and `seed_index` turns a
// string key into a stable list position for table lookups.
//
// No stage shares a generator with another. Each calls `SeedRng::derive` with
// its own purpose string, so adding a draw to one stage never shifts the
// stream another stage sees, and stages may run in any order or in parallel.
//
// Output must be bit-identical on every platform and build profile. The
// generator state only ever sees integer arithmetic; floats are produced from
// the top 53 bits of a draw and never fed back.

use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64 of the UTF-8 bytes of `s`.
pub fn seed_hash(s: &str) -> u64 {
    s.bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Stable position in a list of `len` entries for `key`: `seed_hash(key) % len`.
/// An empty list yields 0.
pub fn seed_index(key: &str, len: usize) -> usize {
    match len {
        0 => 0,
        n => (seed_hash(key) % n as u64) as usize,
    }
}

/// xoshiro256++ state. Serializable so a half-consumed stream can be
/// snapshotted and resumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRng {
    s: [u64; 4],
}

impl SeedRng {
    /// Expand a 64-bit seed into the full state with SplitMix64.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        let mut s = [0u64; 4];
        for word in &mut s {
            *word = splitmix64(&mut sm);
        }
        SeedRng { s }
    }

    pub fn from_seed_str(seed: &str) -> Self {
        Self::new(seed_hash(seed))
    }

    /// Generator for one stage: seeded from `"{seed}:{purpose}"`.
    pub fn derive(seed: &str, purpose: &str) -> Self {
        Self::from_seed_str(&format!("{seed}:{purpose}"))
    }

    pub fn next_u64(&mut self) -> u64 {
        let [s0, s1, s2, s3] = self.s;
        let out = s0.wrapping_add(s3).rotate_left(23).wrapping_add(s0);

        let t = s1 << 17;
        let s2 = s2 ^ s0;
        let s3 = s3 ^ s1;
        let s1 = s1 ^ s2;
        let s0 = s0 ^ s3;
        self.s = [s0, s1, s2 ^ t, s3.rotate_left(45)];

        out
    }

    /// Uniform in [0, 1), 53 bits of precision.
    pub fn next_f64(&mut self) -> f64 {
        const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
        (self.next_u64() >> 11) as f64 * SCALE
    }

    /// Uniform in `[low, high)`. Panics unless `low < high`.
    pub fn range_f64(&mut self, low: f64, high: f64) -> f64 {
        assert!(low < high, "range_f64: empty range {low}..{high}");
        low + self.next_f64() * (high - low)
    }

    /// Uniform integer in `[low, high)` without modulo bias. Panics unless
    /// `low < high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: empty range {low}..{high}");
        let span = high - low;
        // Draws below `2^64 mod span` would over-weight the low residues.
        let reject_below = span.wrapping_neg() % span;
        loop {
            let draw = self.next_u64();
            if draw >= reject_below {
                return low + draw % span;
            }
        }
    }

    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Uniform integer in `[low, high]`. Panics if `low > high`.
    pub fn range_usize_inclusive(&mut self, low: usize, high: usize) -> usize {
        assert!(low <= high, "range_usize_inclusive: empty range {low}..={high}");
        self.range_u64(low as u64, high as u64 + 1) as usize
    }

    /// Bernoulli draw: `true` with probability `p` (clamped by construction:
    /// `p <= 0` never, `p >= 1` always).
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
