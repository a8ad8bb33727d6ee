//! Deterministic random number generation.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Seed for reproducible shuffling and parameter initialization.
///
/// ```rust
/// use minilearn_core::Seed;
/// use rand::Rng;
///
/// let mut a = Seed::new(7).to_rng();
/// let mut b = Seed::new(7).to_rng();
/// assert_eq!(a.gen::<u32>(), b.gen::<u32>());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Seed(u64);

impl Seed {
    /// Create a seed from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw seed value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// A fresh ChaCha8 generator for this seed.
    #[must_use]
    pub fn to_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    /// Derive an independent stream for `key` (e.g. `"train"`, `"init"`).
    #[must_use]
    pub fn derive(&self, key: &str) -> Self {
        // splitmix64 over the seed folded with the key bytes
        let mut z = key
            .bytes()
            .fold(self.0, |acc, b| acc.rotate_left(5) ^ u64::from(b));
        z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self(z ^ (z >> 31))
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}
