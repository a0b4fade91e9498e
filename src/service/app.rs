//! Main application state and service coordination
//!
//! `AppState` owns the store, the notification transport, the registration
//! handler and every background task: the queue processor, the schema
//! trimmer, the health server and the AMQP consumer.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{ClientRequestConsumer, MessageHandler};
use crate::amqp::messages::ClientRequest;
use crate::amqp::publisher::{AmqpNotificationPublisher, PublisherConfig};
use crate::config::AppConfig;
use crate::error::{MatchmakingError, Result as MatchmakingResult};
use crate::matchmaking::QueueProcessor;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::notify::{ConnectionHub, NotificationSink};
use crate::registration::RegistrationHandler;
use crate::store::{InMemoryWaitEntryStore, SchemaTrimmer, WaitEntryStore};
use crate::tracking::{MetricsTracker, Tracker};
use crate::utils::millis;
use crate::wait_time::{TimeToMatch, TimeToMatchReader};
use amqprs::channel::QueueDeclareArguments;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Routes decoded client requests to the registration handler
pub struct ClientRequestDispatcher {
    registration: Arc<RegistrationHandler>,
    metrics_collector: Arc<MetricsCollector>,
}

impl ClientRequestDispatcher {
    pub fn new(
        registration: Arc<RegistrationHandler>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            registration,
            metrics_collector,
        }
    }
}

#[async_trait]
impl MessageHandler for ClientRequestDispatcher {
    async fn handle_client_request(&self, request: ClientRequest) -> MatchmakingResult<()> {
        let start_time = Instant::now();
        let action = request.action();

        let result = match request {
            ClientRequest::Connect {
                connection_id,
                client,
            } => {
                self.registration.connect(&connection_id, &client).await;
                Ok(())
            }
            ClientRequest::Register {
                connection_id,
                client,
                party,
            } => {
                self.registration
                    .register(&connection_id, &client, party)
                    .await;
                Ok(())
            }
            ClientRequest::Unregister { connection_id } => self
                .registration
                .unregister(&connection_id)
                .await
                .map(|_| ()),
            ClientRequest::TimeToMatch { connection_id } => {
                self.registration.reply_time_to_match(&connection_id).await;
                Ok(())
            }
        };

        let elapsed = start_time.elapsed();
        self.metrics_collector
            .record_amqp_operation(action, result.is_ok(), elapsed);
        debug!("Handled {} request in {:.2}ms", action, millis(elapsed));

        result
    }

    async fn handle_error(&self, error: MatchmakingError, message_data: &[u8]) {
        error!(
            "Client request failed - error: '{}', message_size: {} bytes",
            error,
            message_data.len()
        );

        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            error!("Message preview: {:?}", preview);
        }

        self.metrics_collector
            .record_amqp_operation("decode", false, Duration::ZERO);
    }
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    store: Arc<dyn WaitEntryStore>,
    notifier: Arc<dyn NotificationSink>,
    tracker: Arc<dyn Tracker>,
    metrics_collector: Arc<MetricsCollector>,
    registration: Arc<RegistrationHandler>,
    dispatcher: Arc<ClientRequestDispatcher>,
    time_to_match: TimeToMatch,

    /// Present when notifications are delivered in process
    hub: Option<Arc<ConnectionHub>>,
    /// Present when AMQP is enabled
    amqp_connection: Option<Arc<AmqpConnection>>,

    shutdown_tx: broadcast::Sender<()>,
    processor_task: Mutex<Option<JoinHandle<()>>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    queue_consumer: tokio::sync::Mutex<Option<ClientRequestConsumer>>,
    health_server: Mutex<Option<Arc<HealthServer>>>,

    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing fireteams matchmaking service");
        info!(
            "Configuration: service={}, amqp_enabled={}, amqp_url={}",
            config.service.name, config.amqp.enabled, config.amqp.url
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let store: Arc<dyn WaitEntryStore> =
            Arc::new(InMemoryWaitEntryStore::with_config(config.store_config()));
        let tracker: Arc<dyn Tracker> = Arc::new(MetricsTracker::new(metrics_collector.clone()));

        let mut hub = None;
        let mut amqp_connection = None;
        let notifier: Arc<dyn NotificationSink> = if config.amqp.enabled {
            let connection = Self::initialize_amqp(&config).await?;
            let publisher =
                Self::initialize_publisher(&config, &connection, metrics_collector.clone())
                    .await?;
            amqp_connection = Some(connection);
            Arc::new(publisher)
        } else {
            info!("AMQP disabled - notifications are delivered through the connection hub");
            let connection_hub = Arc::new(ConnectionHub::new());
            hub = Some(connection_hub.clone());
            connection_hub
        };

        let time_to_match = TimeToMatch::new(config.matchmaking.time_to_match_capacity);

        let registration = Arc::new(
            RegistrationHandler::new(
                store.clone(),
                notifier.clone(),
                tracker.clone(),
                metrics_collector.clone(),
                time_to_match.reader(),
            )
            .with_client_policy(config.client_policy()),
        );
        let dispatcher = Arc::new(ClientRequestDispatcher::new(
            registration.clone(),
            metrics_collector.clone(),
        ));

        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            config,
            store,
            notifier,
            tracker,
            metrics_collector,
            registration,
            dispatcher,
            time_to_match,
            hub,
            amqp_connection,
            shutdown_tx,
            processor_task: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            queue_consumer: tokio::sync::Mutex::new(None),
            health_server: Mutex::new(None),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start all background services and message consumption
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting fireteams matchmaking service");

        *self.is_running.write().await = true;

        self.start_health_server().await?;
        self.start_queue_processor()?;
        self.start_amqp_consumption().await?;
        self.start_background_tasks()?;

        info!("✅ Fireteams matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of fireteams service");

        *self.is_running.write().await = false;

        if let Some(consumer) = self.queue_consumer.lock().await.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP message consumption stopped");
            }
        }

        // No receivers just means nothing is running yet
        let _ = self.shutdown_tx.send(());

        let processor = self.lock_processor()?.take();
        if let Some(task) = processor {
            match tokio::time::timeout(self.config.shutdown_timeout(), task).await {
                Ok(Ok(())) => info!("✅ Queue processor stopped"),
                Ok(Err(e)) => warn!("Queue processor task ended abnormally: {}", e),
                Err(_) => warn!("Queue processor did not stop within the shutdown timeout"),
            }
        }

        self.stop_background_tasks()?;

        let health_server = self
            .health_server
            .lock()
            .map_err(|_| Self::poisoned("health server"))?
            .take();
        if let Some(server) = health_server {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        if let Some(connection) = &self.amqp_connection {
            if let Err(e) = connection.close().await {
                warn!("Failed to close AMQP connection: {}", e);
            } else {
                info!("✅ AMQP connection closed");
            }
        }

        match self.store.approx_population().await {
            Ok(population) => info!(
                "Final queue state - waiting: {}, time to match: {}",
                population,
                self.time_to_match.reader().display()
            ),
            Err(e) => warn!("Failed to read final queue state: {}", e),
        }

        info!("✅ Fireteams service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn store(&self) -> Arc<dyn WaitEntryStore> {
        self.store.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    pub fn registration(&self) -> Arc<RegistrationHandler> {
        self.registration.clone()
    }

    /// Handle a client request without going through AMQP
    pub async fn handle_request(&self, request: ClientRequest) -> MatchmakingResult<()> {
        self.dispatcher.handle_client_request(request).await
    }

    /// The in-process hub, when AMQP is disabled
    pub fn hub(&self) -> Option<Arc<ConnectionHub>> {
        self.hub.clone()
    }

    pub fn time_to_match(&self) -> TimeToMatchReader {
        self.time_to_match.reader()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// `None` before the processor has been started
    pub fn processor_alive(&self) -> Option<bool> {
        let task = self.processor_task.lock().ok()?;
        task.as_ref().map(|handle| !handle.is_finished())
    }

    /// `None` when AMQP is disabled
    pub fn amqp_alive(&self) -> Option<bool> {
        self.amqp_connection
            .as_ref()
            .map(|connection| connection.is_alive())
    }

    fn poisoned(what: &str) -> ServiceError {
        ServiceError::BackgroundTask {
            message: format!("{} lock poisoned", what),
        }
    }

    fn lock_processor(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<JoinHandle<()>>>, ServiceError> {
        self.processor_task
            .lock()
            .map_err(|_| Self::poisoned("processor task"))
    }

    /// Connect to the broker with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let mut amqp_config =
            AmqpConfig::from_url(&config.amqp.url).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    async fn initialize_publisher(
        config: &AppConfig,
        connection: &AmqpConnection,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<AmqpNotificationPublisher, ServiceError> {
        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open publisher channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            exchange: config.amqp.exchange_name.clone(),
            ..PublisherConfig::default()
        };

        let publisher = AmqpNotificationPublisher::new(channel, publisher_config)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to set up notification publisher: {}", e),
            })?;

        Ok(publisher.with_metrics(metrics_collector))
    }

    /// Start the health and metrics HTTP server
    async fn start_health_server(self: &Arc<Self>) -> Result<(), ServiceError> {
        let port = self.config.service.health_port;
        info!("Starting health and metrics endpoints on port {}", port);

        let health_config = HealthServerConfig {
            port,
            host: "0.0.0.0".to_string(),
        };
        let server = Arc::new(
            HealthServer::new(health_config, self.metrics_collector.clone())
                .with_app_state(self.clone()),
        );

        let task = {
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.start().await {
                    error!("Health server failed: {}", e);
                }
            })
        };

        *self
            .health_server
            .lock()
            .map_err(|_| Self::poisoned("health server"))? = Some(server);
        self.background_tasks
            .lock()
            .map_err(|_| Self::poisoned("background tasks"))?
            .push(task);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }

    /// Spawn the single queue processor loop
    fn start_queue_processor(&self) -> Result<(), ServiceError> {
        let mut slot = self.lock_processor()?;
        if slot.is_some() {
            return Err(ServiceError::Initialization {
                message: "Queue processor already started".to_string(),
            });
        }

        let processor = QueueProcessor::new(
            self.store.clone(),
            self.notifier.clone(),
            self.tracker.clone(),
            self.metrics_collector.clone(),
        )
        .with_config(self.config.processor_config())
        .with_time_to_match(self.time_to_match.clone());

        let shutdown = self.shutdown_tx.subscribe();
        *slot = Some(tokio::spawn(processor.run(shutdown)));

        info!("✅ Queue processor started");
        Ok(())
    }

    /// Declare the request queue and start consuming it
    async fn start_amqp_consumption(&self) -> Result<(), ServiceError> {
        let Some(connection) = &self.amqp_connection else {
            info!("AMQP disabled - skipping request consumption");
            return Ok(());
        };

        let queue_name = &self.config.amqp.queue_name;
        info!("Starting AMQP consumption from '{}'...", queue_name);

        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue_declare_args = QueueDeclareArguments::new(queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        let consumer = ClientRequestConsumer::new(self.dispatcher.clone(), channel);
        consumer
            .start_consuming(queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming messages: {}", e),
            })?;

        *self.queue_consumer.lock().await = Some(consumer);

        info!("Now listening for client requests on '{}'", queue_name);
        Ok(())
    }

    /// Start background maintenance tasks
    fn start_background_tasks(&self) -> Result<(), ServiceError> {
        let trim_interval = self.config.schema_trim_interval();
        info!(
            "Starting schema trim task ({}s interval)...",
            trim_interval.as_secs()
        );
        let trimmer = Arc::new(
            SchemaTrimmer::new(self.store.clone()).with_metrics(self.metrics_collector.clone()),
        );
        let trim_task = trimmer.start_trim_task(trim_interval);

        info!("Starting service metrics task (60s interval)...");
        let service_metrics_task = {
            let metrics_collector = self.metrics_collector.clone();
            let store = self.store.clone();
            let started_at = self.started_at;
            let mut shutdown = self.shutdown_tx.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));

                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        _ = shutdown.recv() => break,
                    }

                    let uptime_seconds = started_at.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    let store_healthy = store.approx_population().await.is_ok();
                    metrics_collector.update_component_health("wait_entry_store", store_healthy);

                    debug!("Updated service metrics - uptime: {}s", uptime_seconds);
                }

                debug!("Service metrics task stopped");
            })
        };

        let mut tasks = self
            .background_tasks
            .lock()
            .map_err(|_| Self::poisoned("background tasks"))?;
        tasks.push(trim_task);
        tasks.push(service_metrics_task);

        info!("{} background tasks running", tasks.len());
        Ok(())
    }

    /// Stop all background tasks
    fn stop_background_tasks(&self) -> Result<(), ServiceError> {
        let mut tasks = self
            .background_tasks
            .lock()
            .map_err(|_| Self::poisoned("background tasks"))?;

        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return Ok(());
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
        Ok(())
    }
}
