//! Secure randomness for envelope salts.
//!
//! `ring::rand::SystemRandom` draws from the operating system on every call.
//! The generator instance is still held behind a swappable handle so that the
//! host scheduler can replace it periodically (hourly by default) without
//! stalling concurrent encryptions. The generator and its refresh time share
//! one lock, and a swap holds it only long enough to store both.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::CryptOperationError;

/// Default interval between generator refreshes.
pub const REFRESH_INTERVAL_SECS: i64 = 3_600;

/// Thread-safe, refreshable salt generator.
#[derive(Debug)]
pub struct SaltSource {
    state: RwLock<(Arc<SystemRandom>, DateTime<Utc>)>,
    interval: Duration,
}

impl Default for SaltSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SaltSource {
    pub fn new() -> Self {
        Self::with_interval(Duration::seconds(REFRESH_INTERVAL_SECS))
    }

    /// A source whose refresh falls due after `interval`.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            state: RwLock::new((Arc::new(SystemRandom::new()), Utc::now())),
            interval,
        }
    }

    /// Fill `buf` with fresh random bytes.
    pub fn fill(&self, buf: &mut [u8]) -> Result<(), CryptOperationError> {
        let rng = Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner).0);
        rng.fill(buf).map_err(|_| CryptOperationError::Randomness)
    }

    /// Allocate and fill `len` random bytes.
    pub fn bytes(&self, len: usize) -> Result<Vec<u8>, CryptOperationError> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Replace the generator instance and restart the refresh clock.
    pub fn refresh(&self) {
        let fresh = Arc::new(SystemRandom::new());
        let now = Utc::now();
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = (fresh, now);
        tracing::debug!(refreshed_at = %now, "salt generator refreshed");
    }

    /// When the generator was last replaced.
    pub fn refreshed_at(&self) -> DateTime<Utc> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).1
    }

    /// Whether the refresh interval has elapsed at `now`.
    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        now - self.refreshed_at() >= self.interval
    }
}
