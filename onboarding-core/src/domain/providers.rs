//! Clock and randomness providers
//!
//! The entity base contract and the 2FA subsystem never read the system clock
//! or a global RNG directly; they receive a [`Providers`] bundle so tests can
//! pin time and make randomness reproducible.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of random bytes and bounded integers
pub trait RandomSource: Send + Sync {
    /// Fill `dest` with random bytes
    fn fill_bytes(&self, dest: &mut [u8]);

    /// Uniform integer in the inclusive range `low..=high`
    fn range_inclusive(&self, low: u8, high: u8) -> u8;
}

/// Clock + randomness handed to entity constructors and mutators
#[derive(Clone)]
pub struct Providers {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl Providers {
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn random(&self) -> &dyn RandomSource {
        self.random.as_ref()
    }

    /// Random (v4) guid drawn from the injected source
    pub fn new_guid(&self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.random.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

impl fmt::Debug for Providers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
