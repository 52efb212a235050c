//! Randomized pacing between campaign sends
//!
//! Each pause is drawn uniformly from the campaign's inclusive
//! `[min, max]` range in whole seconds. The sleeping itself goes through
//! [`Sleeper`] so tests can observe the drawn delays without waiting.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::DelayRange;

/// Source of randomized inter-send delays
pub struct DelayPolicy {
    rng: Mutex<StdRng>,
}

impl DelayPolicy {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence for tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn next_delay(&self, range: DelayRange) -> Duration {
        // DelayRange::new rejects min > max, but rows can predate that check
        let (lo, hi) = if range.min <= range.max {
            (range.min, range.max)
        } else {
            (range.max, range.min)
        };

        let secs = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(lo..=hi),
            Err(poisoned) => poisoned.into_inner().gen_range(lo..=hi),
        };
        Duration::from_secs(secs)
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeping on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested sleeps and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        match self.slept.lock() {
            Ok(slept) => slept.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut slept) => slept.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
        tokio::task::yield_now().await;
    }
}
