use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::transport::{PublishAck, Transport, TransportMessage, KEY_HEADER};

const STREAM_NAME: &str = "IN_MEMORY";

/// Records every acknowledged message in publish order.
///
/// Publish attempts are numbered from 1 across the lifetime of the transport;
/// attempts registered with [`InMemoryTransport::fail_on_attempt`] are rejected
/// once and not recorded.
pub struct InMemoryTransport {
    messages: Mutex<Vec<TransportMessage>>,
    failing_attempts: Mutex<HashSet<u64>>,
    attempts: AtomicU64,
    sequence: AtomicU64,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failing_attempts: Mutex::new(HashSet::new()),
            attempts: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Make the n-th publish attempt (1-based) fail
    pub fn fail_on_attempt(&self, attempt: u64) {
        self.lock_failures().insert(attempt);
    }

    /// Snapshot of all acknowledged messages, oldest first
    pub fn published(&self) -> Vec<TransportMessage> {
        self.lock_messages().clone()
    }

    /// Number of publish attempts so far, including failed ones
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn lock_messages(&self) -> std::sync::MutexGuard<'_, Vec<TransportMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashSet<u64>> {
        self.failing_attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish_acked(
        &self,
        subject: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<PublishAck, TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.lock_failures().remove(&attempt) {
            return Err(TransportError::AckFailed(format!(
                "injected failure on attempt {}",
                attempt
            )));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut headers = HashMap::new();
        headers.insert(KEY_HEADER.to_string(), key.to_string());

        self.lock_messages().push(TransportMessage {
            subject: subject.to_string(),
            key: key.to_string(),
            payload,
            headers,
            timestamp: chrono::Utc::now().timestamp_millis(),
            sequence,
        });

        Ok(PublishAck {
            stream: STREAM_NAME.to_string(),
            sequence,
            duplicate: false,
        })
    }
}
