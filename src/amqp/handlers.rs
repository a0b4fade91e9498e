//! AMQP consumer for client requests
//!
//! Edge servers hold the client connections and forward what clients ask for
//! to the request queue; this consumer decodes each request and hands it to a
//! [`MessageHandler`].

use crate::amqp::messages::{ClientRequest, MessageUtils};
use crate::error::{MatchmakingError, Result};
use crate::utils::millis;
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Trait defining the interface for handling client requests
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one decoded client request
    async fn handle_client_request(&self, request: ClientRequest) -> Result<()>;

    /// Handle a message that could not be decoded or processed
    async fn handle_error(&self, error: MatchmakingError, message_data: &[u8]);
}

/// Consumer for the client request queue
pub struct ClientRequestConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl ClientRequestConsumer {
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("fireteams-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(RequestConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming client requests from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming client requests");
        Ok(())
    }
}

struct RequestConsumer {
    handler: Arc<dyn MessageHandler>,
}

impl RequestConsumer {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let request = MessageUtils::deserialize_client_request(content)?;

        debug!(
            "Client request parsed - action: {}, connection: '{}'",
            request.action(),
            request.connection_id()
        );

        self.handler.handle_client_request(request).await
    }
}

#[async_trait]
impl AsyncConsumer for RequestConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let start_time = Instant::now();

        debug!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag,
            deliver.routing_key(),
            content.len()
        );

        match self.process_message(&content).await {
            Ok(()) => {
                debug!(
                    "Message processed - delivery_tag: {}, processing_time: {:.2}ms",
                    delivery_tag,
                    millis(start_time.elapsed())
                );
            }
            Err(e) => {
                error!(
                    "Message processing failed - delivery_tag: {}, processing_time: {:.2}ms, error: {}",
                    delivery_tag,
                    millis(start_time.elapsed()),
                    e
                );
                let error = match e.downcast::<MatchmakingError>() {
                    Ok(error) => error,
                    Err(other) => MatchmakingError::InternalError {
                        message: other.to_string(),
                    },
                };
                self.handler.handle_error(error, &content).await;
            }
        }

        // Requests are never redelivered: a bad one would fail the same way again
        if let Err(e) = channel
            .basic_ack(BasicAckArguments::new(delivery_tag, false))
            .await
        {
            warn!("Failed to ack delivery {}: {}", delivery_tag, e);
        }
    }
}

/// Handler that records every request, for tests
#[derive(Default)]
pub struct RecordingMessageHandler {
    pub received_requests: tokio::sync::Mutex<Vec<ClientRequest>>,
}

impl RecordingMessageHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageHandler for RecordingMessageHandler {
    async fn handle_client_request(&self, request: ClientRequest) -> Result<()> {
        self.received_requests.lock().await.push(request);
        Ok(())
    }

    async fn handle_error(&self, error: MatchmakingError, _message_data: &[u8]) {
        warn!("Recording handler received error: {}", error);
    }
}
