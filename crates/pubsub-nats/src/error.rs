use async_nats::jetstream::ErrorCode;
use async_nats::jetstream::consumer::pull::BatchErrorKind;
use async_nats::jetstream::context::{
    CreateStreamErrorKind, DeleteStreamErrorKind, GetStreamErrorKind, PublishErrorKind,
};
use async_nats::jetstream::stream::ConsumerErrorKind;
use durable_pubsub::BrokerError;
use thiserror::Error;

/// Errors that can occur talking to NATS.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to acknowledge a message.
    #[error("Failed to acknowledge message: {0}")]
    Ack(#[source] async_nats::Error),

    /// Failed to connect.
    #[error("Failed to connect to NATS: {0}")]
    Connect(#[from] async_nats::ConnectError),

    /// Failed to create a consumer.
    #[error("Failed to create consumer: {0}")]
    ConsumerCreate(ConsumerErrorKind),

    /// Failed to look up a consumer.
    #[error("Failed to get consumer info: {0}")]
    ConsumerInfo(ConsumerErrorKind),

    /// Failed to drain the client.
    #[error("Failed to drain client: {0}")]
    Drain(#[source] async_nats::Error),

    /// Failed to pull messages.
    #[error("Failed to fetch messages: {0}")]
    Fetch(BatchErrorKind),

    /// No server URLs were configured.
    #[error("No NATS servers configured")]
    NoServers,

    /// Failed to publish.
    #[error("Failed to publish: {0}")]
    Publish(PublishErrorKind),

    /// Failed to create a stream.
    #[error("Failed to create stream: {0}")]
    StreamCreate(CreateStreamErrorKind),

    /// Failed to delete a stream.
    #[error("Failed to delete stream: {0}")]
    StreamDelete(DeleteStreamErrorKind),

    /// Failed to look up a stream.
    #[error("Failed to get stream info: {0}")]
    StreamInfo(GetStreamErrorKind),
}

impl BrokerError for Error {
    fn is_not_found(&self) -> bool {
        match self {
            Self::StreamInfo(GetStreamErrorKind::JetStream(e)) => {
                e.error_code() == ErrorCode::STREAM_NOT_FOUND
            }
            // A missing stream also means the consumer does not exist.
            Self::ConsumerInfo(ConsumerErrorKind::JetStream(e)) => {
                e.error_code() == ErrorCode::CONSUMER_NOT_FOUND
                    || e.error_code() == ErrorCode::STREAM_NOT_FOUND
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::error::Error as StdError;
    use std::io;

    #[test]
    fn test_ack_error_keeps_its_source() {
        let error = Error::Ack(Box::new(io::Error::other("connection reset")));

        let source = error.source().expect("source");
        assert!(source.downcast_ref::<io::Error>().is_some());
        assert_eq!(error.to_string(), "Failed to acknowledge message: connection reset");
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_drain_error_keeps_its_source() {
        let error = Error::Drain(Box::new(io::Error::other("flush timed out")));

        let source = error.source().expect("source");
        assert_eq!(source.to_string(), "flush timed out");
        assert!(source.downcast_ref::<io::Error>().is_some());
    }
}
