pub mod subjects;
mod transport;

pub use subjects::{sanitize_subject_token, SubjectBuilder};
pub use transport::NatsTransport;
