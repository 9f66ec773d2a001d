use crate::notifier::Notifier;
use parlor_core::{EconomyLedger, GameConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handles every session is constructed with.
#[derive(Clone)]
pub struct GameContext {
    pub ledger: Arc<EconomyLedger>,
    pub config: Arc<GameConfig>,
    pub notifier: Notifier,
    rng_streams: Arc<AtomicU64>,
}

impl GameContext {
    pub fn new(ledger: Arc<EconomyLedger>, config: Arc<GameConfig>, notifier: Notifier) -> Self {
        Self {
            ledger,
            config,
            notifier,
            rng_streams: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A fresh generator per session; seeded runs stay reproducible because
    /// sessions are numbered in creation order.
    pub fn session_rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                let stream = self.rng_streams.fetch_add(1, Ordering::Relaxed);
                StdRng::seed_from_u64(seed.wrapping_add(stream))
            }
            None => StdRng::from_entropy(),
        }
    }
}
