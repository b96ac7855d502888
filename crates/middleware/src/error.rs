use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("publish not acknowledged: {0}")]
    AckFailed(String),
    #[error("stream setup failed: {0}")]
    StreamSetup(String),
}
