//! Deterministic RNG for simulation

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use slotgrid_core::io::RngProvider;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Seeded ChaCha20 generator
///
/// The same seed yields the same sequence, so identifiers generated during a
/// failing run can be reproduced.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    rng: Arc<Mutex<ChaCha20Rng>>,
    fork_counter: Arc<AtomicU64>,
}

impl DeterministicRng {
    /// Create a generator with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            fork_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Seed from `DST_SEED`, or pick a random seed
    ///
    /// Always logs the seed for reproducibility.
    pub fn from_env_or_random() -> Self {
        let seed = seed_from_env_or_random();
        tracing::info!(seed, "DST seed (set DST_SEED={} to replay)", seed);
        Self::new(seed)
    }

    /// Seed this generator was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn lock(&self) -> MutexGuard<'_, ChaCha20Rng> {
        // The generator holds no invariant a panicking holder could break
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Random value in `[min, max)`
    pub fn next_range(&self, min: u64, max: u64) -> u64 {
        debug_assert!(min < max, "min must be less than max");
        self.lock().gen_range(min..max)
    }

    /// Random bool that is true with the given probability
    pub fn next_bool(&self, probability: f64) -> bool {
        debug_assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1]"
        );
        self.lock().gen::<f64>() < probability
    }

    /// Random index for a slice of the given length
    pub fn next_index(&self, len: usize) -> usize {
        debug_assert!(len > 0, "length must be positive");
        self.lock().gen_range(0..len)
    }

    /// Shuffle a slice in place
    pub fn shuffle<T>(&self, slice: &mut [T]) {
        let mut rng = self.lock();
        for i in (1..slice.len()).rev() {
            let j = rng.gen_range(0..=i);
            slice.swap(i, j);
        }
    }

    /// Independent stream seeded deterministically from this one
    pub fn fork(&self) -> Self {
        let fork_id = self.fork_counter.fetch_add(1, Ordering::SeqCst);
        let fork_seed = self
            .seed
            .wrapping_add(fork_id)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self::new(fork_seed)
    }
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RngProvider for DeterministicRng {
    fn next_u64(&self) -> u64 {
        self.lock().gen()
    }
}

pub(crate) fn seed_from_env_or_random() -> u64 {
    std::env::var("DST_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(rand::random)
}
