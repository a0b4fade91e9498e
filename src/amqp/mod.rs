//! AMQP transport for the queue engine
//!
//! Client requests arrive on a queue; client notifications leave through a
//! topic exchange routed by connection id.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;

pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{ClientRequestConsumer, MessageHandler};
pub use messages::*;
pub use publisher::{AmqpNotificationPublisher, PublisherConfig};
