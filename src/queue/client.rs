//! NATS JetStream client for envelope transport.
//!
//! Provides connection management, stream provisioning, and publishing of
//! encoded envelope buffers. Subjects follow `envelopes.<queue>` so one
//! stream can back several logical queues.

use std::time::Duration;

use async_nats::jetstream;

/// Connection and stream settings, with environment-variable defaults.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub url: String,
    pub stream_name: String,
    pub max_age: Duration,
    pub max_bytes: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            stream_name: std::env::var("NATS_STREAM")
                .unwrap_or_else(|_| "ENVELOPES".to_string()),
            max_age: Duration::from_secs(24 * 60 * 60), // 24 hours
            max_bytes: 1024 * 1024 * 1024,              // 1GB
        }
    }
}

#[derive(Clone)]
pub struct QueueClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    stream_name: String,
}

impl QueueClient {
    /// Connect to NATS and make sure the envelope stream exists.
    pub async fn connect(config: QueueConfig) -> Result<Self, async_nats::Error> {
        let client = async_nats::connect(&config.url).await?;
        tracing::info!("Connected to NATS at {}", config.url);

        let jetstream = jetstream::new(client.clone());

        let _stream = jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: vec!["envelopes.>".to_string()],
                max_age: config.max_age,
                max_bytes: config.max_bytes,
                storage: jetstream::stream::StorageType::File,
                num_replicas: 1,
                ..Default::default()
            })
            .await?;

        tracing::info!("JetStream stream '{}' ready", config.stream_name);

        Ok(Self {
            client,
            jetstream,
            stream_name: config.stream_name,
        })
    }

    /// Publish an encoded buffer (data or reference message) to a queue.
    pub async fn publish(
        &self,
        queue_name: &str,
        buffer: Vec<u8>,
    ) -> Result<(), async_nats::Error> {
        let subject = format!("envelopes.{}", queue_name);
        let size = buffer.len();

        // Publish with JetStream (durable, acknowledged)
        let ack = self.jetstream.publish(subject.clone(), buffer.into()).await?;
        ack.await?;

        tracing::debug!("Published {} bytes to JetStream subject {}", size, subject);
        Ok(())
    }

    /// Get JetStream context for advanced operations
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Check if the NATS connection is active
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }
}
