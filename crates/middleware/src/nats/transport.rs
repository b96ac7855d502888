use std::time::Duration;

use async_nats::jetstream::stream::{Config, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, Context};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::transport::{PublishAck, Transport, KEY_HEADER};

/// NATS JetStream transport. Every publish waits for the stream ack.
pub struct NatsTransport {
    client: Client,
    jetstream: Context,
}

impl NatsTransport {
    /// Create a new NatsTransport from an existing client
    pub fn new(client: Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }

    /// Connect to NATS server and create transport
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client))
    }

    /// Flush buffered client writes; used on shutdown
    pub async fn flush(&self) -> Result<(), TransportError> {
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))
    }

    /// Create the JetStream stream if it does not exist yet
    pub async fn ensure_stream(
        &self,
        stream_name: &str,
        subjects: Vec<String>,
        max_age: Duration,
    ) -> Result<(), TransportError> {
        let config = Config {
            name: stream_name.to_string(),
            subjects,
            retention: RetentionPolicy::Limits,
            storage: StorageType::File,
            max_age,
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(config)
            .await
            .map_err(|e| TransportError::StreamSetup(e.to_string()))?;

        tracing::info!(stream = %stream_name, "stream ready");
        Ok(())
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn publish_acked(
        &self,
        subject: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<PublishAck, TransportError> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(KEY_HEADER, key);

        let ack = self
            .jetstream
            .publish_with_headers(subject.to_string(), headers, payload)
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?
            .await
            .map_err(|e| TransportError::AckFailed(e.to_string()))?;

        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running NATS server with JetStream
    // Run: docker run -p 4222:4222 nats:latest -js

    #[tokio::test]
    #[ignore] // Requires NATS server with JetStream
    async fn test_publish_acked_returns_sequence() {
        let transport = NatsTransport::connect("nats://localhost:4222").await.unwrap();
        transport
            .ensure_stream("TEST_ACK", vec!["test-ack.>".to_string()], Duration::from_secs(60))
            .await
            .unwrap();

        let first = transport
            .publish_acked("test-ack.trade.SBER", "SBER", Bytes::from("a"))
            .await
            .unwrap();
        let second = transport
            .publish_acked("test-ack.trade.SBER", "SBER", Bytes::from("b"))
            .await
            .unwrap();

        assert_eq!(first.stream, "TEST_ACK");
        assert!(second.sequence > first.sequence);
    }

    #[tokio::test]
    #[ignore] // Requires NATS server
    async fn test_publish_without_stream_fails_ack() {
        let transport = NatsTransport::connect("nats://localhost:4222").await.unwrap();
        let result = transport
            .publish_acked("no-stream-here.trade.SBER", "SBER", Bytes::from("x"))
            .await;
        assert!(result.is_err());
    }
}
