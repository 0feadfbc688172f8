use durable_pubsub::BrokerError;
use thiserror::Error;

/// Errors that can occur in the in-memory broker.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// A consumer with the same name but another configuration exists.
    #[error("consumer {consumer} already exists on stream {stream} with a different configuration")]
    ConsumerExists {
        /// The stream name.
        stream: String,
        /// The consumer name.
        consumer: String,
    },

    /// Consumer does not exist.
    #[error("consumer {consumer} not found on stream {stream}")]
    ConsumerNotFound {
        /// The stream name.
        stream: String,
        /// The consumer name.
        consumer: String,
    },

    /// The broker was drained.
    #[error("broker drained")]
    Drained,

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No stream captures the subject.
    #[error("no stream captures subject {0}")]
    NoStreamForSubject(String),

    /// A stream with the same name but another configuration exists.
    #[error("stream {0} already exists with a different configuration")]
    StreamExists(String),

    /// Stream does not exist.
    #[error("stream {0} not found")]
    StreamNotFound(String),

    /// Simulated transport outage.
    #[error("broker unavailable")]
    Unavailable,
}

impl BrokerError for Error {
    fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StreamNotFound(_) | Self::ConsumerNotFound { .. }
        )
    }
}
