//! Utility functions for the matchmaking engine

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique work queue message id
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new unique connection id
pub fn generate_connection_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Absolute distance between a level and a (possibly fractional) average
pub fn level_difference(level: u32, average: f64) -> f64 {
    (level as f64 - average).abs()
}

/// Milliseconds as a float, for log lines
pub fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
