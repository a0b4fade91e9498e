//! Fireteam assembly
//!
//! The queue processor drives everything here: it seeds a [`Fireteam`], asks a
//! [`MatchEvaluator`] for ranked candidates, claims them greedily and paces
//! itself with a [`PacingPolicy`].

pub mod evaluator;
pub mod fireteam;
pub mod pacing;
pub mod processor;

pub use evaluator::{LevelBasedMatchEvaluator, MatchEvaluator};
pub use fireteam::Fireteam;
pub use pacing::PacingPolicy;
pub use processor::{IterationOutcome, QueueProcessor, QueueProcessorConfig};
