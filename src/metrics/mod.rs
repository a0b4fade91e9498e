//! Metrics and monitoring for the fireteams queue engine

pub mod collector;
pub mod health;

pub use collector::{
    ClientMetrics, MatchMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, QueueMetrics,
    ServiceMetrics,
};
pub use health::{HealthServer, HealthServerConfig};
