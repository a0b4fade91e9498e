//! Service layer for the fireteams matchmaking service
//!
//! This module contains the main application state, service coordination,
//! and background task management for the production service.

pub mod app;
pub mod health;

pub use app::{AppState, ClientRequestDispatcher, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceStats};
