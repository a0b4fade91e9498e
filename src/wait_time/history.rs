//! Rolling history of how long seeds waited before a full fireteam

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::warn;

/// Default number of matches kept in the history
pub const DEFAULT_CAPACITY: usize = 100;

/// Means above this are shown as "10+ mins"
const DISPLAY_CUTOFF: Duration = Duration::from_secs(10 * 60);

/// Fixed-capacity ring buffer of wait durations. Pushing into a full buffer
/// overwrites the oldest sample.
#[derive(Debug, Clone)]
pub struct TimeToMatchHistory {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl TimeToMatchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, wait: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(wait);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean of the retained samples, `None` when empty
    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    /// Human-readable mean: "N/A", "10+ mins" or "{m}m {ss}s"
    pub fn display(&self) -> String {
        format_mean(self.mean())
    }
}

impl Default for TimeToMatchHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn format_mean(mean: Option<Duration>) -> String {
    match mean {
        None => "N/A".to_string(),
        Some(mean) if mean > DISPLAY_CUTOFF => "10+ mins".to_string(),
        Some(mean) => {
            let secs = mean.as_secs();
            format!("{}m {:02}s", secs / 60, secs % 60)
        }
    }
}

/// Writable handle owned by the queue processor
#[derive(Debug, Clone)]
pub struct TimeToMatch {
    history: Arc<RwLock<TimeToMatchHistory>>,
}

impl TimeToMatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Arc::new(RwLock::new(TimeToMatchHistory::new(capacity))),
        }
    }

    pub fn record(&self, wait: Duration) {
        match self.history.write() {
            Ok(mut history) => history.push(wait),
            Err(_) => warn!("Time to match history lock poisoned, dropping sample"),
        }
    }

    /// Read-only view for request handlers and the stats endpoint
    pub fn reader(&self) -> TimeToMatchReader {
        TimeToMatchReader {
            history: self.history.clone(),
        }
    }
}

impl Default for TimeToMatch {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Read-only view of the history
#[derive(Debug, Clone)]
pub struct TimeToMatchReader {
    history: Arc<RwLock<TimeToMatchHistory>>,
}

impl TimeToMatchReader {
    pub fn mean(&self) -> Option<Duration> {
        self.history.read().ok().and_then(|history| history.mean())
    }

    pub fn sample_count(&self) -> usize {
        self.history
            .read()
            .map(|history| history.len())
            .unwrap_or(0)
    }

    pub fn display(&self) -> String {
        format_mean(self.mean())
    }
}
