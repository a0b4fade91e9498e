//! Analytics event tracking
//!
//! Tracking is fire-and-forget. A [`Tracker`] never blocks the caller and never
//! reports failure.

use crate::metrics::MetricsCollector;
use crate::types::ConnectionId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One analytics event about a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub subject_id: ConnectionId,
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<u64>,
}

impl TrackedEvent {
    pub fn new(
        subject_id: impl Into<ConnectionId>,
        category: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            category: category.into(),
            action: action.into(),
            label: None,
            value: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: u64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Trait for analytics sinks
#[cfg_attr(test, mockall::automock)]
pub trait Tracker: Send + Sync {
    fn track_event(&self, event: TrackedEvent);
}

/// Counts events in Prometheus and logs them at debug level
pub struct MetricsTracker {
    metrics_collector: Arc<MetricsCollector>,
}

impl MetricsTracker {
    pub fn new(metrics_collector: Arc<MetricsCollector>) -> Self {
        Self { metrics_collector }
    }
}

impl Tracker for MetricsTracker {
    fn track_event(&self, event: TrackedEvent) {
        self.metrics_collector
            .record_tracked_event(&event.category, &event.action);

        debug!(
            "Tracked {}/{} for {} (label: {:?}, value: {:?})",
            event.category, event.action, event.subject_id, event.label, event.value
        );
    }
}

/// Keeps every event in memory for tests
#[derive(Debug, Default)]
pub struct RecordingTracker {
    events: Mutex<Vec<TrackedEvent>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events about one client
    pub fn events_for(&self, subject_id: &str) -> Vec<TrackedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.subject_id == subject_id)
            .collect()
    }

    pub fn count(&self, category: &str, action: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.category == category && event.action == action)
            .count()
    }
}

impl Tracker for RecordingTracker {
    fn track_event(&self, event: TrackedEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
