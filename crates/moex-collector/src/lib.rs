//! moex-collector: polls MOEX ISS trades and publishes them to NATS
//! JetStream with at-least-once delivery, resuming from a persisted
//! watermark after restarts.

pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fetcher;
pub mod limiter;
pub mod metrics;
pub mod publisher;
pub mod server;
pub mod shutdown;
pub mod trade;
pub mod watermark;

pub use collector::{Collector, CollectorSettings, CycleOutcome, CyclePhase};
pub use config::Config;
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
