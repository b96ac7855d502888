use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Header carrying the ordering key of a message
pub const KEY_HEADER: &str = "Msg-Key";

/// Message envelope with metadata, as seen by the broker
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub subject: String,
    pub key: String,
    pub payload: Bytes,
    pub headers: HashMap<String, String>,
    /// Broker receive time, epoch milliseconds
    pub timestamp: i64,
    pub sequence: u64,
}

/// Broker acknowledgement for a single published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAck {
    pub stream: String,
    pub sequence: u64,
    /// Broker reported the message as an already-stored duplicate
    pub duplicate: bool,
}

/// Transport abstraction for acknowledged publishing
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish one message and wait until the broker has stored it.
    ///
    /// `key` is the ordering key; messages sharing a key keep their relative
    /// order on the broker. Returns only after the acknowledgement arrives,
    /// never fire-and-forget.
    async fn publish_acked(
        &self,
        subject: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<PublishAck, TransportError>;
}
