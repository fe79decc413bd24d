//! Durable publisher for due-job events.

pub mod amqp;
pub mod memory;

use async_trait::async_trait;

use crate::error::PublishError;

pub use amqp::AmqpPublisher;
pub use memory::TestBroker;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Serialises `payload` to JSON and publishes it to the pre-declared
    /// durable queue with persistent delivery, content type
    /// `application/json`, and `message_id = key`.
    async fn publish_json(&self, payload: &serde_json::Value, key: &str) -> Result<(), PublishError>;

    /// Releases the channel and connection.
    async fn close(&self) -> Result<(), PublishError>;
}
