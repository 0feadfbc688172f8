use crate::config::{
    ConsumerConfig, ConsumerInfo, FetchRequest, PublishAck, StreamConfig, StreamInfo,
};

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for broker errors.
pub trait BrokerError: Error + Send + Sync + 'static {
    /// Whether the error means the requested stream or consumer does not exist.
    ///
    /// Reconciliation treats this as the signal to create, and any other error
    /// as a failure.
    fn is_not_found(&self) -> bool;
}

/// A message handed out by a pull, awaiting acknowledgment.
#[async_trait]
pub trait Delivery
where
    Self: Debug + Send + Sync + 'static,
{
    /// The error type for acknowledgments.
    type Error: BrokerError;

    /// The subject the message was published on.
    fn subject(&self) -> &str;

    /// The raw payload.
    fn payload(&self) -> Bytes;

    /// The deduplication identifier the message was published with.
    fn msg_id(&self) -> Option<&str>;

    /// The sequence of the message in its stream.
    fn stream_sequence(&self) -> u64;

    /// How many times the message has been delivered, including this time.
    fn delivered(&self) -> u64;

    /// Acknowledges the message, advancing the consumer.
    async fn ack(&self) -> Result<(), Self::Error>;

    /// Negatively acknowledges the message so it is redelivered.
    async fn nak(&self) -> Result<(), Self::Error>;

    /// Gives up on the message so it is never redelivered.
    async fn term(&self) -> Result<(), Self::Error>;
}

/// A handle bound to one durable consumer.
#[async_trait]
pub trait PullHandle
where
    Self: Debug + Send + Sync + 'static,
{
    /// The error type for pulls.
    type Error: BrokerError;

    /// The delivered message type.
    type Delivery: Delivery<Error = Self::Error>;

    /// Pulls up to `request.batch_size` messages, waiting at most
    /// `request.expires` for the first one. An empty batch is not an error.
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<Self::Delivery>, Self::Error>;
}

/// The primitive operations of a persistent streaming broker.
///
/// Implementations are pure adapters: lookups report absence through
/// [`BrokerError::is_not_found`] and never create anything on their own.
#[async_trait]
pub trait Broker
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the broker.
    type Error: BrokerError;

    /// The pull handle type.
    type Pull: PullHandle<Error = Self::Error>;

    /// Looks up a stream.
    async fn stream_info(&self, stream_name: &str) -> Result<StreamInfo, Self::Error>;

    /// Creates a stream.
    async fn add_stream(&self, config: StreamConfig) -> Result<StreamInfo, Self::Error>;

    /// Deletes a stream together with its consumers.
    async fn delete_stream(&self, stream_name: &str) -> Result<(), Self::Error>;

    /// Looks up a durable consumer.
    async fn consumer_info(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<ConsumerInfo, Self::Error>;

    /// Creates a durable consumer.
    async fn add_consumer(
        &self,
        stream_name: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, Self::Error>;

    /// Binds a pull handle to an existing durable consumer.
    async fn bind(&self, stream_name: &str, consumer_name: &str)
    -> Result<Self::Pull, Self::Error>;

    /// Publishes a payload with a deduplication identifier.
    async fn publish(
        &self,
        subject: &str,
        msg_id: &str,
        payload: Bytes,
    ) -> Result<PublishAck, Self::Error>;

    /// The servers this broker is, or may be, connected to.
    fn servers(&self) -> Vec<String>;

    /// Stops inbound deliveries, flushes pending publishes, and closes.
    async fn drain(&self) -> Result<(), Self::Error>;
}
