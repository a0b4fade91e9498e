//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::notify::ClientNotification;
use crate::registration::ClientInfo;
use crate::types::{ConnectionId, Party};
use serde::{Deserialize, Serialize};

/// Queue the edge servers publish client requests to
pub const CLIENT_REQUESTS_QUEUE: &str = "fireteams.client_requests";

/// Topic exchange client notifications are published to
pub const CLIENT_NOTIFICATIONS_EXCHANGE: &str = "fireteams.client_notifications";

/// Routing key for notifications addressed to one connection
pub fn client_routing_key(connection_id: &str) -> String {
    format!("client.{}", connection_id)
}

/// A request forwarded from a client connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientRequest {
    /// A client opened a connection
    Connect {
        connection_id: ConnectionId,
        client: ClientInfo,
    },
    /// A client wants to join matchmaking
    Register {
        connection_id: ConnectionId,
        client: ClientInfo,
        party: Party,
    },
    /// A client left or disconnected
    Unregister { connection_id: ConnectionId },
    /// A client asked for the average time to match
    TimeToMatch { connection_id: ConnectionId },
}

impl ClientRequest {
    pub fn connection_id(&self) -> &str {
        match self {
            ClientRequest::Connect { connection_id, .. }
            | ClientRequest::Register { connection_id, .. }
            | ClientRequest::Unregister { connection_id }
            | ClientRequest::TimeToMatch { connection_id } => connection_id,
        }
    }

    /// Short name for logs and metric labels
    pub fn action(&self) -> &'static str {
        match self {
            ClientRequest::Connect { .. } => "connect",
            ClientRequest::Register { .. } => "register",
            ClientRequest::Unregister { .. } => "unregister",
            ClientRequest::TimeToMatch { .. } => "time_to_match",
        }
    }
}

/// Outbound notification with its addressee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub connection_id: ConnectionId,
    pub notification: ClientNotification,
}

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InvalidRequest {
                reason: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Decode a client request, accepting both a bare request and one wrapped
    /// in a [`MessageEnvelope`]
    pub fn deserialize_client_request(bytes: &[u8]) -> Result<ClientRequest> {
        let request = match serde_json::from_slice::<ClientRequest>(bytes) {
            Ok(request) => request,
            Err(_) => MessageEnvelope::<ClientRequest>::from_bytes(bytes)?.payload,
        };

        Self::validate_client_request(&request)?;
        Ok(request)
    }

    /// Structural checks; party rules are left to registration
    pub fn validate_client_request(request: &ClientRequest) -> Result<()> {
        if request.connection_id().trim().is_empty() {
            return Err(MatchmakingError::InvalidRequest {
                reason: "Connection ID cannot be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Wrap a notification for the client exchange
    pub fn notification_envelope(
        connection_id: &str,
        notification: ClientNotification,
    ) -> MessageEnvelope<NotificationMessage> {
        MessageEnvelope::new(
            NotificationMessage {
                connection_id: connection_id.to_string(),
                notification,
            },
            client_routing_key(connection_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Activity, Language, Platform};

    fn register_request() -> ClientRequest {
        ClientRequest::Register {
            connection_id: "conn-1".to_string(),
            client: ClientInfo::web("v1"),
            party: Party {
                language: Language::French,
                platform: Platform::PS4,
                activity: Activity::WeeklyStrike,
                party_size: 2,
                username: "Ghost".to_string(),
                level: 27,
            },
        }
    }

    #[test]
    fn test_decode_bare_request() {
        let json = r#"{"action":"unregister","connection_id":"abc"}"#;
        let request = MessageUtils::deserialize_client_request(json.as_bytes()).unwrap();
        assert_eq!(
            request,
            ClientRequest::Unregister {
                connection_id: "abc".to_string()
            }
        );
        assert_eq!(request.action(), "unregister");
    }

    #[test]
    fn test_decode_enveloped_request() {
        let envelope = MessageEnvelope::new(register_request(), "client.request".to_string());
        let bytes = envelope.to_bytes().unwrap();

        let request = MessageUtils::deserialize_client_request(&bytes).unwrap();
        assert_eq!(request, register_request());
        assert_eq!(request.connection_id(), "conn-1");
    }

    #[test]
    fn test_rejects_empty_connection_id() {
        let json = r#"{"action":"time_to_match","connection_id":"  "}"#;
        tokio_test::assert_err!(MessageUtils::deserialize_client_request(json.as_bytes()));
    }

    #[test]
    fn test_rejects_garbage() {
        tokio_test::assert_err!(MessageUtils::deserialize_client_request(b"not json"));
    }

    #[test]
    fn test_notification_envelope_routing() {
        let envelope = MessageUtils::notification_envelope(
            "conn-9",
            ClientNotification::UpdateStatus {
                text: "Searching".to_string(),
            },
        );

        assert_eq!(envelope.routing_key, "client.conn-9");
        assert_eq!(envelope.payload.connection_id, "conn-9");
        assert!(!envelope.correlation_id.is_empty());
    }
}
