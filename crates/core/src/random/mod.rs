use rand::{seq::IndexedRandom, Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Mixing constant so that neighbouring owner ids land on unrelated streams.
const STREAM_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Per-owner random source. Every worker, the sequencer and the star field
/// each hold one, so no RNG state is ever shared between threads.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: Pcg32,
}

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Pcg32::seed_from_u64(seed),
        }
    }

    /// Derives an independent generator for `owner` from a run seed.
    pub fn for_owner(seed: u64, owner: u64) -> Self {
        Self::seeded(seed ^ owner.wrapping_add(1).wrapping_mul(STREAM_MIX))
    }

    /// Uniform float in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.inner.random::<f64>()
    }

    /// Uniform integer in `[lo, hi)`. An empty range yields `lo`.
    pub fn int_range(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.inner.random_range(lo..hi)
    }

    /// Uniform pick from `items`. Repeated entries act as weights.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.inner)
    }

    /// Like [`SimRng::choose`] but falls back to `default` on an empty slice.
    pub fn choose_or<T: Copy>(&mut self, items: &[T], default: T) -> T {
        self.choose(items).copied().unwrap_or(default)
    }
}
