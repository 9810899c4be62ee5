//! Injected randomness for bonus rolls.
//!
//! Tick and reconciliation draw from separate streams so the order in which
//! drivers interleave them never perturbs the other's sequence.
use hmac::{Hmac, Mac};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::Sha256;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::constants::{RNG_STREAM_OFFLINE, RNG_STREAM_TICK};

/// Deterministic bundle of RNG streams segregated by engine domain.
#[derive(Debug)]
pub struct RngBundle {
    tick: Mutex<CountingRng<ChaCha20Rng>>,
    offline: Mutex<CountingRng<ChaCha20Rng>>,
}

impl RngBundle {
    /// Construct the bundle from a root seed.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            tick: Mutex::new(CountingRng::new(derive_stream_seed(seed, RNG_STREAM_TICK))),
            offline: Mutex::new(CountingRng::new(derive_stream_seed(
                seed,
                RNG_STREAM_OFFLINE,
            ))),
        }
    }

    /// Access the online tick stream.
    pub fn tick(&self) -> MutexGuard<'_, CountingRng<ChaCha20Rng>> {
        self.tick.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Access the offline reconciliation stream.
    pub fn offline(&self) -> MutexGuard<'_, CountingRng<ChaCha20Rng>> {
        self.offline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Draw counts as `(tick, offline)`.
    #[must_use]
    pub fn draws(&self) -> (u64, u64) {
        (self.tick().draws(), self.offline().draws())
    }
}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<ChaCha20Rng> {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            draws: 0,
        }
    }
}

impl<R: rand::RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: rand::RngCore> rand::RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

fn derive_stream_seed(root_seed: u64, domain_tag: &[u8]) -> u64 {
    // HMAC accepts keys of any length, so the fallback is unreachable.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&root_seed.to_le_bytes()) else {
        return root_seed;
    };
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
