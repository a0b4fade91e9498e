//! Client notifications
//!
//! The engine talks to clients only through [`NotificationSink`]. Every call is
//! best-effort: a sink swallows unknown or disconnected connections, and callers
//! log any error it does return and move on.

pub mod hub;
pub mod recording;

pub use hub::ConnectionHub;
pub use recording::RecordingNotificationSink;

use crate::error::Result;
use crate::types::Party;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status shown while the queue processor works on a seed
pub const STATUS_EVALUATING: &str = "Evaluating";

/// Status shown while a party waits in the pool
pub const STATUS_SEARCHING: &str = "Searching";

/// A message delivered to one client connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientNotification {
    DisplayInfo { message: String },
    DisplayWarning { message: String },
    DisplayError { message: String },
    UpdateStatus { text: String },
    UpdateProgress { current: u32, target: u32 },
    MatchFound { parties: Vec<Party> },
    /// Reply to a time-to-match query
    TimeToMatch { display: String },
}

impl ClientNotification {
    /// Short name used for routing keys and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            ClientNotification::DisplayInfo { .. } => "display_info",
            ClientNotification::DisplayWarning { .. } => "display_warning",
            ClientNotification::DisplayError { .. } => "display_error",
            ClientNotification::UpdateStatus { .. } => "update_status",
            ClientNotification::UpdateProgress { .. } => "update_progress",
            ClientNotification::MatchFound { .. } => "match_found",
            ClientNotification::TimeToMatch { .. } => "time_to_match",
        }
    }
}

/// Trait for delivering notifications to connected clients
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification to one connection
    async fn notify(&self, connection_id: &str, notification: ClientNotification) -> Result<()>;

    async fn display_info(&self, connection_id: &str, message: &str) -> Result<()> {
        self.notify(
            connection_id,
            ClientNotification::DisplayInfo {
                message: message.to_string(),
            },
        )
        .await
    }

    async fn display_warning(&self, connection_id: &str, message: &str) -> Result<()> {
        self.notify(
            connection_id,
            ClientNotification::DisplayWarning {
                message: message.to_string(),
            },
        )
        .await
    }

    async fn display_error(&self, connection_id: &str, message: &str) -> Result<()> {
        self.notify(
            connection_id,
            ClientNotification::DisplayError {
                message: message.to_string(),
            },
        )
        .await
    }

    async fn update_status(&self, connection_id: &str, text: &str) -> Result<()> {
        self.notify(
            connection_id,
            ClientNotification::UpdateStatus {
                text: text.to_string(),
            },
        )
        .await
    }

    async fn update_progress(&self, connection_id: &str, current: u32, target: u32) -> Result<()> {
        self.notify(
            connection_id,
            ClientNotification::UpdateProgress { current, target },
        )
        .await
    }

    async fn match_found(&self, connection_id: &str, parties: Vec<Party>) -> Result<()> {
        self.notify(connection_id, ClientNotification::MatchFound { parties })
            .await
    }
}
