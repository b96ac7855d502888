//! moex-middleware: broker transport abstractions
//!
//! Provides the acknowledged-publish `Transport` trait used by the trade
//! collector, a NATS JetStream implementation, and an in-memory
//! implementation for testing.

pub mod error;
pub mod memory;
pub mod nats;
pub mod transport;

pub use error::TransportError;
pub use memory::InMemoryTransport;
pub use nats::{sanitize_subject_token, NatsTransport, SubjectBuilder};
pub use transport::{PublishAck, Transport, TransportMessage, KEY_HEADER};
