use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for handler errors.
pub trait HandlerError: Error + Send + Sync + 'static {}

/// A message delivered to a handler.
#[derive(Clone, Debug)]
pub struct Message<T = Bytes> {
    /// The subject the message was published on.
    pub subject: String,

    /// The deduplication identifier the message was published with.
    pub msg_id: Option<String>,

    /// The decoded payload.
    pub payload: T,

    /// Delivery attempt, starting at one.
    pub delivered: u64,
}

/// A trait representing the business logic behind a subscription.
///
/// Returning `Ok` acknowledges the message. Returning an error negatively
/// acknowledges it so the broker redelivers it.
#[async_trait]
pub trait SubscriptionHandler<T = Bytes>
where
    Self: Clone + Debug + Send + Sync + 'static,
    T: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the handler.
    type Error: HandlerError;

    /// Handles the given message.
    async fn handle(&self, message: Message<T>) -> Result<(), Self::Error>;
}
