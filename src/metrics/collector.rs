//! Metrics collection using Prometheus
//!
//! Metric groups for the fireteams queue engine: service plumbing, the queue
//! loop, completed matches, client traffic, and timings.

use crate::types::Activity;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    service_metrics: ServiceMetrics,
    queue_metrics: QueueMetrics,
    match_metrics: MatchMetrics,
    client_metrics: ClientMetrics,
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue loop metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Loop iterations by outcome
    pub iterations_total: IntCounterVec,

    /// Claim-by-delete attempts by role and result
    pub claims_total: IntCounterVec,

    /// Approximate number of waiting entries
    pub waiting_population: IntGauge,

    /// Sleep chosen after the last iteration
    pub current_sleep_ms: IntGauge,

    /// Entries removed by the schema trimmer
    pub trimmed_entries_total: IntCounter,
}

/// Completed and partial fireteam metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Full fireteams by activity
    pub matches_total: IntCounterVec,

    /// Partial fireteams returned to the pool
    pub partial_fireteams_total: IntCounter,

    /// Players per assembled fireteam
    pub fireteam_size: Histogram,

    /// Seed wait before a match
    pub time_to_match_seconds: Histogram,
}

/// Client-facing traffic
#[derive(Clone)]
pub struct ClientMetrics {
    /// Registration attempts by result
    pub registrations_total: IntCounterVec,

    /// Withdrawals by result
    pub unregistrations_total: IntCounterVec,

    /// Notifications by kind and delivery status
    pub notifications_total: IntCounterVec,

    /// Analytics events by category and action
    pub tracked_events_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Duration of one queue loop iteration
    pub iteration_duration: Histogram,

    /// Registration request handling time
    pub registration_duration: Histogram,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let client_metrics = ClientMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
            client_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn client(&self) -> &ClientMetrics {
        &self.client_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record the end of one queue loop iteration
    pub fn record_iteration(&self, outcome: &str, duration: Duration) {
        self.queue_metrics
            .iterations_total
            .with_label_values(&[outcome])
            .inc();

        self.performance_metrics
            .iteration_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a claim-by-delete attempt. `role` is "seed", "candidate" or
    /// "withdrawal".
    pub fn record_claim(&self, role: &str, won: bool) {
        let result = if won { "won" } else { "lost" };
        self.queue_metrics
            .claims_total
            .with_label_values(&[role, result])
            .inc();
    }

    /// Record the pacing decision for the next iteration
    pub fn record_pacing(&self, population: Option<usize>, sleep: Duration) {
        if let Some(population) = population {
            self.queue_metrics
                .waiting_population
                .set(population as i64);
        }
        self.queue_metrics
            .current_sleep_ms
            .set(sleep.as_millis() as i64);
    }

    pub fn record_trimmed(&self, count: usize) {
        self.queue_metrics
            .trimmed_entries_total
            .inc_by(count as u64);
    }

    /// Record a full fireteam
    pub fn record_match(&self, activity: Activity, players: u32, seed_wait: Duration) {
        self.match_metrics
            .matches_total
            .with_label_values(&[activity.code()])
            .inc();

        self.match_metrics.fireteam_size.observe(players as f64);

        self.match_metrics
            .time_to_match_seconds
            .observe(seed_wait.as_secs_f64());
    }

    /// Record a fireteam that could not be filled
    pub fn record_partial(&self, players: u32) {
        self.match_metrics.partial_fireteams_total.inc();
        self.match_metrics.fireteam_size.observe(players as f64);
    }

    /// Record a registration attempt
    pub fn record_registration(&self, success: bool, duration: Duration) {
        let result = if success { "success" } else { "failed" };
        self.client_metrics
            .registrations_total
            .with_label_values(&[result])
            .inc();

        self.performance_metrics
            .registration_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_unregistration(&self, removed: bool) {
        let result = if removed { "removed" } else { "not_found" };
        self.client_metrics
            .unregistrations_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record a notification delivery attempt
    pub fn record_notification(&self, kind: &str, delivered: bool) {
        let status = if delivered { "delivered" } else { "failed" };
        self.client_metrics
            .notifications_total
            .with_label_values(&[kind, status])
            .inc();
    }

    pub fn record_tracked_event(&self, category: &str, action: &str) {
        self.client_metrics
            .tracked_events_total
            .with_label_values(&[category, action])
            .inc();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("fireteams_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "fireteams_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("fireteams_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "fireteams_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("fireteams_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let iterations_total = IntCounterVec::new(
            Opts::new(
                "fireteams_queue_iterations_total",
                "Queue loop iterations by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(iterations_total.clone()))?;

        let claims_total = IntCounterVec::new(
            Opts::new("fireteams_claims_total", "Claim-by-delete attempts"),
            &["role", "result"],
        )?;
        registry.register(Box::new(claims_total.clone()))?;

        let waiting_population = IntGauge::new(
            "fireteams_waiting_population",
            "Approximate number of waiting parties",
        )?;
        registry.register(Box::new(waiting_population.clone()))?;

        let current_sleep_ms = IntGauge::new(
            "fireteams_queue_sleep_milliseconds",
            "Sleep before the next queue iteration",
        )?;
        registry.register(Box::new(current_sleep_ms.clone()))?;

        let trimmed_entries_total = IntCounter::new(
            "fireteams_trimmed_entries_total",
            "Entries removed for an outdated schema version",
        )?;
        registry.register(Box::new(trimmed_entries_total.clone()))?;

        Ok(Self {
            iterations_total,
            claims_total,
            waiting_population,
            current_sleep_ms,
            trimmed_entries_total,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_total = IntCounterVec::new(
            Opts::new("fireteams_matches_total", "Full fireteams assembled"),
            &["activity"],
        )?;
        registry.register(Box::new(matches_total.clone()))?;

        let partial_fireteams_total = IntCounter::new(
            "fireteams_partial_fireteams_total",
            "Fireteams returned to the pool unfilled",
        )?;
        registry.register(Box::new(partial_fireteams_total.clone()))?;

        let fireteam_size = Histogram::with_opts(
            HistogramOpts::new("fireteams_fireteam_size", "Players per assembled fireteam")
                .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        )?;
        registry.register(Box::new(fireteam_size.clone()))?;

        let time_to_match_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "fireteams_time_to_match_seconds",
                "Seed wait before a full fireteam",
            )
            .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        )?;
        registry.register(Box::new(time_to_match_seconds.clone()))?;

        Ok(Self {
            matches_total,
            partial_fireteams_total,
            fireteam_size,
            time_to_match_seconds,
        })
    }
}

impl ClientMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let registrations_total = IntCounterVec::new(
            Opts::new("fireteams_registrations_total", "Registration attempts"),
            &["result"],
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let unregistrations_total = IntCounterVec::new(
            Opts::new("fireteams_unregistrations_total", "Withdrawal requests"),
            &["result"],
        )?;
        registry.register(Box::new(unregistrations_total.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new("fireteams_notifications_total", "Client notifications"),
            &["kind", "status"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let tracked_events_total = IntCounterVec::new(
            Opts::new("fireteams_tracked_events_total", "Analytics events"),
            &["category", "action"],
        )?;
        registry.register(Box::new(tracked_events_total.clone()))?;

        Ok(Self {
            registrations_total,
            unregistrations_total,
            notifications_total,
            tracked_events_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let iteration_duration = Histogram::with_opts(
            HistogramOpts::new(
                "fireteams_iteration_duration_seconds",
                "Queue loop iteration time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(iteration_duration.clone()))?;

        let registration_duration = Histogram::with_opts(
            HistogramOpts::new(
                "fireteams_registration_duration_seconds",
                "Registration handling time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(registration_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "fireteams_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            iteration_duration,
            registration_duration,
            amqp_operation_duration,
        })
    }
}
