//! Time-to-match reporting
//!
//! The queue processor records how long each matched seed waited; clients and
//! the stats endpoint read the rolling mean.

pub mod history;

pub use history::{TimeToMatch, TimeToMatchHistory, TimeToMatchReader, DEFAULT_CAPACITY};
