//! Fireteams - matchmaking queue engine
//!
//! Parties register into a shared pool; a single queue processor repeatedly
//! takes the next work item, claims the waiting party it names and assembles
//! a fireteam around it from compatible candidates. Claiming is an atomic
//! delete on the wait entry store, so any number of processors and
//! withdrawing clients can race safely.

pub mod amqp;
pub mod config;
pub mod error;
pub mod matchmaking;
pub mod metrics;
pub mod notify;
pub mod registration;
pub mod service;
pub mod store;
pub mod tracking;
pub mod types;
pub mod utils;
pub mod wait_time;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use matchmaking::{MatchEvaluator, QueueProcessor};
pub use notify::NotificationSink;
pub use registration::RegistrationHandler;
pub use store::{InMemoryWaitEntryStore, WaitEntryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
