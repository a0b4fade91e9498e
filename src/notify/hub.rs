//! In-process notification hub with one channel per connected client

use crate::error::{MatchmakingError, Result};
use crate::notify::{ClientNotification, NotificationSink};
use crate::types::ConnectionId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Routes notifications to per-connection streams
#[derive(Debug, Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ClientNotification>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the stream of its notifications.
    /// Reconnecting with the same id replaces the previous stream.
    pub fn connect(
        &self,
        connection_id: impl Into<ConnectionId>,
    ) -> Result<UnboundedReceiverStream<ClientNotification>> {
        let connection_id = connection_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connections = self
            .connections
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire connections lock".to_string(),
            })?;
        connections.insert(connection_id.clone(), tx);

        debug!("Client {} connected to notification hub", connection_id);
        Ok(UnboundedReceiverStream::new(rx))
    }

    /// Drop a connection. Returns whether it was connected.
    pub fn disconnect(&self, connection_id: &str) -> bool {
        match self.connections.write() {
            Ok(mut connections) => connections.remove(connection_id).is_some(),
            Err(_) => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .map(|connections| connections.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationSink for ConnectionHub {
    async fn notify(&self, connection_id: &str, notification: ClientNotification) -> Result<()> {
        let sender = {
            let connections =
                self.connections
                    .read()
                    .map_err(|_| MatchmakingError::NotificationFailure {
                        connection_id: connection_id.to_string(),
                        message: "Failed to acquire connections lock".to_string(),
                    })?;
            connections.get(connection_id).cloned()
        };

        match sender {
            Some(tx) => {
                if tx.send(notification).is_err() {
                    debug!(
                        "Client {} stopped listening, dropping notification",
                        connection_id
                    );
                    self.disconnect(connection_id);
                }
            }
            None => {
                debug!(
                    "Client {} is not connected, dropping {} notification",
                    connection_id,
                    notification.kind()
                );
            }
        }

        Ok(())
    }
}
