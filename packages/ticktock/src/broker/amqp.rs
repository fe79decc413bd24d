//! AMQP 0-9-1 backed publisher, matching the Go source's use of an
//! `amqp091` client: a durable queue declared once at construction,
//! persistent delivery mode, and `content_type = application/json`.

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::error::PublishError;

use super::Publisher;

pub struct AmqpPublisher {
    connection: Connection,
    channel: Channel,
    queue: String,
}

impl AmqpPublisher {
    /// Connects to `url` and idempotently declares `queue` as durable,
    /// non-exclusive, non-auto-delete.
    pub async fn connect(url: &str, queue: &str) -> Result<Self, PublishError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(Self {
            connection,
            channel,
            queue: queue.to_string(),
        })
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish_json(&self, payload: &serde_json::Value, key: &str) -> Result<(), PublishError> {
        let body = serde_json::to_vec(payload)?;
        let properties = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .with_content_type("application/json".into())
            .with_message_id(key.to_string().into())
            .with_timestamp(Utc::now().timestamp() as u64);

        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.channel.close(200, "closing").await?;
        self.connection.close(200, "closing").await?;
        Ok(())
    }
}
