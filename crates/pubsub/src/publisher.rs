use crate::broker::Broker;
use crate::config::PublishAck;
use crate::error::Error;
use crate::subject;

use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

/// Options for new publishers.
#[derive(Clone, Debug)]
pub struct PublisherOptions {
    /// The stream to publish into. Created if it does not exist.
    pub stream_name: String,

    /// Deduplication window used when the stream has to be created. Defaults
    /// to two minutes.
    pub duplicate_window: Option<Duration>,
}

/// Publishes messages into one stream with deduplication identifiers.
#[derive(Debug)]
pub struct Publisher<B, T = Bytes, S = Infallible>
where
    B: Broker,
    T: Clone + Debug + Send + Sync + TryInto<Bytes, Error = S> + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    broker: B,
    stream_name: String,
    _marker: PhantomData<T>,
}

impl<B, T, S> Clone for Publisher<B, T, S>
where
    B: Broker,
    T: Clone + Debug + Send + Sync + TryInto<Bytes, Error = S> + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            stream_name: self.stream_name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<B, T, S> Publisher<B, T, S>
where
    B: Broker,
    T: Clone + Debug + Send + Sync + TryInto<Bytes, Error = S> + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    pub(crate) const fn new(broker: B, stream_name: String) -> Self {
        Self {
            broker,
            stream_name,
            _marker: PhantomData,
        }
    }

    /// The stream this publisher writes to.
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Publishes `payload` on `subject`.
    ///
    /// `msg_id` should be derived from the identity of the logical message so
    /// that retried publishes are idempotent. Republishing an identifier within
    /// the stream's duplicate window succeeds with
    /// [`PublishAck::duplicate`] set and stores nothing.
    ///
    /// # Errors
    ///
    /// Fails if the subject belongs to another stream, the identifier is empty,
    /// the payload cannot be serialized, or the broker rejects the publish.
    pub async fn publish(
        &self,
        subject: &str,
        msg_id: &str,
        payload: T,
    ) -> Result<PublishAck, Error<B::Error>> {
        if subject::stream_name::<B::Error>(subject)? != self.stream_name {
            return Err(Error::InvalidSubject(subject.to_string()));
        }

        if msg_id.is_empty() {
            return Err(Error::EmptyMsgId);
        }

        let payload: Bytes = payload
            .try_into()
            .map_err(|e| Error::Serialize(Box::new(e)))?;

        let ack = self
            .broker
            .publish(subject, msg_id, payload)
            .await
            .map_err(Error::Transport)?;

        if ack.duplicate {
            debug!(
                stream = %ack.stream,
                subject = %subject,
                msg_id = %msg_id,
                "duplicate message suppressed by broker"
            );
        }

        Ok(ack)
    }
}
