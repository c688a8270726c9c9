//! Bounded exponential backoff used while waiting for an artifact.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_MS: u64 = 100;
pub const DEFAULT_CEILING_MS: u64 = 16_000;

/// Check offsets doubling from `base_ms` up to and including `ceiling_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffSchedule {
    pub base_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BASE_MS,
            ceiling_ms: DEFAULT_CEILING_MS,
        }
    }
}

impl BackoffSchedule {
    pub fn new(base_ms: u64, ceiling_ms: u64) -> Self {
        Self { base_ms, ceiling_ms }
    }

    /// Offsets at which to check, strictly increasing. Empty when the base is
    /// zero or above the ceiling.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let ceiling = self.ceiling_ms;
        let first = Some(self.base_ms).filter(|&b| b > 0 && b <= ceiling);
        std::iter::successors(first, move |&d| d.checked_mul(2).filter(|&n| n <= ceiling))
            .map(Duration::from_millis)
    }

    /// Offset of the final check, if any.
    pub fn last_delay(&self) -> Option<Duration> {
        self.delays().last()
    }

    pub fn attempts(&self) -> usize {
        self.delays().count()
    }
}
