//! Publishes client notifications to the AMQP topic exchange

use crate::amqp::messages::{MessageEnvelope, MessageUtils, CLIENT_NOTIFICATIONS_EXCHANGE};
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::notify::{ClientNotification, NotificationSink};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for notification publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: CLIENT_NOTIFICATIONS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

/// Notification sink backed by an AMQP channel. Edge servers bind
/// `client.#` and forward each message to the addressed connection.
pub struct AmqpNotificationPublisher {
    channel: Channel,
    config: PublisherConfig,
    metrics_collector: Option<Arc<MetricsCollector>>,
}

impl AmqpNotificationPublisher {
    /// Create a publisher and declare its exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            metrics_collector: None,
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange, "topic");
        self.channel.exchange_declare(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare notification exchange: {}", e),
            }
        })?;

        info!("Declared notification exchange {}", self.config.exchange);
        Ok(())
    }

    /// Publish with exponential backoff between attempts
    async fn publish_with_retry<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(()) => {
                    debug!(
                        "Published message {} with routing key {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl NotificationSink for AmqpNotificationPublisher {
    async fn notify(&self, connection_id: &str, notification: ClientNotification) -> Result<()> {
        let kind = notification.kind();
        let envelope = MessageUtils::notification_envelope(connection_id, notification);

        let start = Instant::now();
        let result = self.publish_with_retry(&envelope).await;

        if let Some(metrics) = &self.metrics_collector {
            metrics.record_amqp_operation("publish_notification", result.is_ok(), start.elapsed());
        }

        result.map_err(|e| {
            MatchmakingError::NotificationFailure {
                connection_id: connection_id.to_string(),
                message: format!("{} not published: {}", kind, e),
            }
            .into()
        })
    }
}
