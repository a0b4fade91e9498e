//! Health checks for the fireteams service
//!
//! Readiness and liveness probes plus a full component check used by the
//! `/stats` endpoint and `--health-check`.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Gauge value for `fireteams_health_status`
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: &HealthStatus) -> HealthStatus {
        match (&self, other) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if not healthy
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl ComponentCheck {
    fn new(name: &str, status: HealthStatus, message: Option<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Queue statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Approximate number of parties waiting
    pub waiting_population: usize,
    /// Connections held by the in-process hub, if it is in use
    pub connections: Option<usize>,
    /// Mean wait before a match, in seconds
    pub time_to_match_seconds: Option<f64>,
    /// Mean wait before a match, as shown to clients
    pub time_to_match_display: String,
    /// Number of matches the mean is taken over
    pub time_to_match_samples: usize,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(&app_state).await,
            Self::check_store(&app_state).await,
            Self::check_processor(&app_state),
            Self::check_amqp(&app_state),
        ];

        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |acc, check| acc.worst(&check.status));

        for check in &checks {
            app_state
                .metrics_collector()
                .update_component_health(&check.name, check.status != HealthStatus::Unhealthy);
        }
        app_state
            .metrics_collector()
            .update_health_status(status.as_gauge());

        let stats = Self::gather_service_stats(&app_state).await;

        Ok(HealthCheck {
            status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - the store answers and the processor is looping
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        let store = Self::check_store(&app_state).await.status;
        let processor = Self::check_processor(&app_state).status;
        Ok(store.worst(&processor))
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck::new("service_running", status, message, start)
    }

    async fn check_store(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match app_state.store().approx_population().await {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (
                HealthStatus::Unhealthy,
                Some(format!("Store unavailable: {}", e)),
            ),
        };

        ComponentCheck::new("wait_entry_store", status, message, start)
    }

    fn check_processor(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match app_state.processor_alive() {
            Some(true) => (HealthStatus::Healthy, None),
            Some(false) => (
                HealthStatus::Unhealthy,
                Some("Queue processor has stopped".to_string()),
            ),
            None => (
                HealthStatus::Degraded,
                Some("Queue processor not started".to_string()),
            ),
        };

        ComponentCheck::new("queue_processor", status, message, start)
    }

    fn check_amqp(app_state: &AppState) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match app_state.amqp_alive() {
            Some(true) => (HealthStatus::Healthy, None),
            Some(false) => (
                HealthStatus::Unhealthy,
                Some("AMQP connection closed".to_string()),
            ),
            None => (
                HealthStatus::Healthy,
                Some("AMQP disabled, notifying in process".to_string()),
            ),
        };

        ComponentCheck::new("amqp_connection", status, message, start)
    }

    /// Gather current queue statistics
    pub async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let waiting_population = match app_state.store().approx_population().await {
            Ok(population) => population,
            Err(e) => {
                debug!("Failed to read population for stats: {}", e);
                0
            }
        };

        let time_to_match = app_state.time_to_match();

        ServiceStats {
            waiting_population,
            connections: app_state.hub().map(|hub| hub.connection_count()),
            time_to_match_seconds: time_to_match.mean().map(|mean| mean.as_secs_f64()),
            time_to_match_display: time_to_match.display(),
            time_to_match_samples: time_to_match.sample_count(),
            uptime_seconds: app_state.uptime().as_secs(),
        }
    }
}

impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status_wins() {
        assert_eq!(
            HealthStatus::Healthy.worst(&HealthStatus::Degraded),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthStatus::Degraded.worst(&HealthStatus::Unhealthy),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            HealthStatus::Healthy.worst(&HealthStatus::Healthy),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn test_gauge_values() {
        assert_eq!(HealthStatus::Healthy.as_gauge(), 2);
        assert_eq!(HealthStatus::Degraded.as_gauge(), 1);
        assert_eq!(HealthStatus::Unhealthy.as_gauge(), 0);
    }
}
