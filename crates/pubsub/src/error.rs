use std::error::Error as StdError;

use thiserror::Error;

use crate::broker::BrokerError;
use crate::mode::SubscriptionMode;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<E>
where
    E: BrokerError,
{
    /// Subscription already started.
    #[error("Subscription already started")]
    AlreadyStarted,

    /// The existing durable consumer was created with a different mode.
    #[error(
        "consumer {consumer} SubscriptionMode has changed (requested {requested}). \
         Please use the existing SubscriptionMode={existing} or delete the consumer"
    )]
    ConfigurationDrift {
        /// The consumer name.
        consumer: String,
        /// The mode the caller asked for.
        requested: SubscriptionMode,
        /// The mode implied by the stored consumer configuration.
        existing: SubscriptionMode,
    },

    /// Consumer create error.
    #[error("consumer {consumer} could not be added to stream {stream}: {source}")]
    ConsumerCreate {
        /// The stream name.
        stream: String,
        /// The consumer name.
        consumer: String,
        /// The broker error.
        #[source]
        source: E,
    },

    /// Consumer lookup error other than absence.
    #[error("failed to get info for consumer {consumer} on stream {stream}: {source}")]
    ConsumerInfo {
        /// The stream name.
        stream: String,
        /// The consumer name.
        consumer: String,
        /// The broker error.
        #[source]
        source: E,
    },

    /// Messages must carry a deduplication identifier.
    #[error("message id must not be empty")]
    EmptyMsgId,

    /// Subject does not name a stream, or names the wrong one.
    #[error("invalid subject: {0:?}")]
    InvalidSubject(String),

    /// Serialization error.
    #[error("failed to serialize payload: {0}")]
    Serialize(Box<dyn StdError + Send + Sync>),

    /// Stream create error.
    #[error("stream {stream} could not be created: {source}")]
    StreamCreate {
        /// The stream name.
        stream: String,
        /// The broker error.
        #[source]
        source: E,
    },

    /// Stream lookup error other than absence.
    #[error("failed to get info for stream {stream}: {source}")]
    StreamInfo {
        /// The stream name.
        stream: String,
        /// The broker error.
        #[source]
        source: E,
    },

    /// The existing durable consumer is bound to another subject.
    #[error(
        "consumer {consumer} is bound to subject {existing}, cannot subscribe to {requested}. \
         Please use another consumer name or delete the consumer"
    )]
    SubjectMismatch {
        /// The consumer name.
        consumer: String,
        /// The subject the caller asked for.
        requested: String,
        /// The filter subject stored on the consumer.
        existing: String,
    },

    /// Any other broker failure.
    #[error(transparent)]
    Transport(E),
}

impl<E> Error<E>
where
    E: BrokerError,
{
    /// Whether the error is a consumer configuration drift.
    #[must_use]
    pub const fn is_configuration_drift(&self) -> bool {
        matches!(self, Self::ConfigurationDrift { .. })
    }
}
