//! Notification sink that records everything it is asked to deliver

use crate::error::{MatchmakingError, Result};
use crate::notify::{ClientNotification, NotificationSink};
use crate::types::ConnectionId;
use async_trait::async_trait;
use std::sync::Mutex;

/// Mock notification sink for testing
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    delivered: Mutex<Vec<(ConnectionId, ClientNotification)>>,
    fail_deliveries: bool,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose transport is down: records nothing and fails every call
    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail_deliveries: true,
        }
    }

    /// Get all delivered notifications in order
    pub fn notifications(&self) -> Vec<(ConnectionId, ClientNotification)> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }

    /// Notifications delivered to one connection
    pub fn for_connection(&self, connection_id: &str) -> Vec<ClientNotification> {
        self.notifications()
            .into_iter()
            .filter(|(id, _)| id == connection_id)
            .map(|(_, notification)| notification)
            .collect()
    }

    /// Count notifications of a kind (see [`ClientNotification::kind`])
    pub fn count_kind(&self, kind: &str) -> usize {
        self.notifications()
            .iter()
            .filter(|(_, notification)| notification.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.clear();
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, connection_id: &str, notification: ClientNotification) -> Result<()> {
        if self.fail_deliveries {
            return Err(MatchmakingError::NotificationFailure {
                connection_id: connection_id.to_string(),
                message: "transport unavailable".to_string(),
            }
            .into());
        }

        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push((connection_id.to_string(), notification));
        }
        Ok(())
    }
}
