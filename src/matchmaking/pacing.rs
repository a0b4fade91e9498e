//! Adaptive sleep between queue iterations
//!
//! A busy pool shortens the pause between iterations. Errors back off to the
//! ceiling.

use std::time::Duration;

/// Bounds and slope of the inter-iteration sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    /// Shortest sleep in milliseconds
    pub floor_ms: u64,
    /// Longest sleep in milliseconds, used after errors
    pub ceiling_ms: u64,
    /// Population at which the sleep reaches zero before clamping
    pub normalization: u64,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            floor_ms: 1000,
            ceiling_ms: 10000,
            normalization: 5000,
        }
    }
}

impl PacingPolicy {
    /// `ceiling - population * (ceiling / normalization)` in integer
    /// milliseconds, clamped to `[floor, ceiling]`
    pub fn sleep_for_population(&self, population: usize) -> Duration {
        let step = self.ceiling_ms / self.normalization.max(1);
        let reduction = (population as u64).saturating_mul(step);
        let millis = self
            .ceiling_ms
            .saturating_sub(reduction)
            .max(self.floor_ms)
            .min(self.ceiling_ms.max(self.floor_ms));
        Duration::from_millis(millis)
    }

    /// Sleep after a failed iteration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms.max(self.floor_ms))
    }
}
