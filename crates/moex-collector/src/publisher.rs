//! Publisher adapter: one trade in, one broker acknowledgement out

use std::sync::Arc;

use bytes::Bytes;
use moex_middleware::{PublishAck, SubjectBuilder, Transport};

use crate::error::PublishError;
use crate::trade::Trade;

/// Sends trades as JSON, keyed and routed by security id so that trades of
/// one instrument keep their relative order on the broker.
pub struct TradePublisher {
    transport: Arc<dyn Transport>,
    subjects: SubjectBuilder,
}

impl TradePublisher {
    pub fn new(transport: Arc<dyn Transport>, subjects: SubjectBuilder) -> Self {
        Self {
            transport,
            subjects,
        }
    }

    /// Publish one trade and wait for the broker acknowledgement
    pub async fn publish(&self, trade: &Trade) -> Result<PublishAck, PublishError> {
        let subject = self.subjects.trade(&trade.security_id);
        let payload = Bytes::from(serde_json::to_vec(trade)?);

        let ack = self
            .transport
            .publish_acked(&subject, &trade.security_id, payload)
            .await?;

        tracing::debug!(
            subject = %subject,
            secid = %trade.security_id,
            trade_id = %trade.trade_id,
            stream = %ack.stream,
            sequence = ack.sequence,
            "trade acknowledged"
        );
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{exchange_timestamp, TradeId};
    use moex_middleware::InMemoryTransport;

    fn trade(id: &str, secid: &str) -> Trade {
        Trade {
            trade_id: TradeId::new(id).unwrap(),
            timestamp: exchange_timestamp("2024-03-01", "10:00:00").unwrap(),
            board_id: "TQBR".to_string(),
            security_id: secid.to_string(),
            price: 250.5,
            quantity: 10,
            value: 2505.0,
        }
    }

    #[tokio::test]
    async fn test_publish_routes_by_security_id() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = TradePublisher::new(transport.clone(), SubjectBuilder::new("iss_data"));

        let ack = publisher.publish(&trade("101", "SBER")).await.unwrap();
        assert_eq!(ack.sequence, 1);

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, "iss_data.trade.SBER");
        assert_eq!(published[0].key, "SBER");

        let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(body["tradeno"], 101);
        assert_eq!(body["secid"], "SBER");
        assert_eq!(body["boardid"], "TQBR");
        assert_eq!(body["quantity"], 10);
    }

    #[tokio::test]
    async fn test_publish_surfaces_broker_failure() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_on_attempt(1);
        let publisher = TradePublisher::new(transport.clone(), SubjectBuilder::new("iss_data"));

        let result = publisher.publish(&trade("101", "SBER")).await;
        assert!(matches!(result, Err(PublishError::Transport(_))));
        assert!(transport.published().is_empty());
    }
}
