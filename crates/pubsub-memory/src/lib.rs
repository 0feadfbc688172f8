//! In-memory implementation of the durable pubsub broker.
//!
//! Models the parts of a persistent streaming broker that ordering depends on:
//! durable consumers with explicit acknowledgment, `max_ack_pending` gating,
//! redelivery after a negative acknowledgment or an expired ack wait, and
//! deduplication of message identifiers within a stream's duplicate window.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod state;

pub use error::Error;

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use durable_pubsub::config::{
    ConsumerConfig, ConsumerInfo, FetchRequest, PublishAck, StreamConfig, StreamInfo,
};
use durable_pubsub::{Broker, Delivery, PullHandle};
use state::{BrokerState, Taken};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Shared {
    drained: AtomicBool,
    notify: Notify,
    servers: Vec<String>,
    state: Mutex<BrokerState>,
    unavailable: AtomicBool,
}

impl Shared {
    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Unavailable);
        }

        if self.drained.load(Ordering::SeqCst) {
            return Err(Error::Drained);
        }

        Ok(())
    }
}

/// An in-process broker. Clones share the same streams and consumers.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_servers(vec!["memory://localhost".to_string()])
    }

    /// Creates an empty broker reporting the given server addresses.
    #[must_use]
    pub fn with_servers(servers: Vec<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                drained: AtomicBool::new(false),
                notify: Notify::new(),
                servers,
                state: Mutex::new(BrokerState::default()),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Simulates losing (or regaining) the connection: while unavailable every
    /// operation fails with [`Error::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    /// Whether [`Broker::drain`] has been called.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.shared.drained.load(Ordering::SeqCst)
    }

    /// Names of the consumers on a stream, sorted.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StreamNotFound`] if the stream does not exist.
    pub async fn consumer_names(&self, stream_name: &str) -> Result<Vec<String>, Error> {
        self.shared.state.lock().await.consumer_names(stream_name)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Error = Error;

    type Pull = MemoryPull;

    async fn stream_info(&self, stream_name: &str) -> Result<StreamInfo, Self::Error> {
        self.shared.check_available()?;
        self.shared.state.lock().await.stream_info(stream_name)
    }

    async fn add_stream(&self, config: StreamConfig) -> Result<StreamInfo, Self::Error> {
        self.shared.check_available()?;
        self.shared.state.lock().await.add_stream(config)
    }

    async fn delete_stream(&self, stream_name: &str) -> Result<(), Self::Error> {
        self.shared.check_available()?;
        self.shared.state.lock().await.delete_stream(stream_name)?;
        self.shared.notify.notify_waiters();

        Ok(())
    }

    async fn consumer_info(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<ConsumerInfo, Self::Error> {
        self.shared.check_available()?;
        self.shared
            .state
            .lock()
            .await
            .consumer_info(stream_name, consumer_name)
    }

    async fn add_consumer(
        &self,
        stream_name: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, Self::Error> {
        self.shared.check_available()?;
        self.shared
            .state
            .lock()
            .await
            .add_consumer(stream_name, config)
    }

    async fn bind(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<MemoryPull, Self::Error> {
        self.shared.check_available()?;
        self.shared
            .state
            .lock()
            .await
            .consumer_info(stream_name, consumer_name)?;

        Ok(MemoryPull {
            consumer_name: consumer_name.to_string(),
            shared: self.shared.clone(),
            stream_name: stream_name.to_string(),
        })
    }

    async fn publish(
        &self,
        subject: &str,
        msg_id: &str,
        payload: Bytes,
    ) -> Result<PublishAck, Self::Error> {
        self.shared.check_available()?;

        let ack = self
            .shared
            .state
            .lock()
            .await
            .publish(subject, msg_id, payload, Instant::now())?;

        if !ack.duplicate {
            self.shared.notify.notify_waiters();
        }

        Ok(ack)
    }

    fn servers(&self) -> Vec<String> {
        self.shared.servers.clone()
    }

    async fn drain(&self) -> Result<(), Self::Error> {
        if self.shared.drained.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!("memory broker drained");
        self.shared.notify.notify_waiters();

        Ok(())
    }
}

/// A pull handle bound to one consumer of a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryPull {
    consumer_name: String,
    shared: Arc<Shared>,
    stream_name: String,
}

#[async_trait]
impl PullHandle for MemoryPull {
    type Error = Error;

    type Delivery = MemoryDelivery;

    async fn fetch(&self, request: FetchRequest) -> Result<Vec<MemoryDelivery>, Self::Error> {
        let deadline = Instant::now() + request.expires;

        loop {
            self.shared.check_available()?;

            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let now = Instant::now();
            let (taken, next_expiry) = self.shared.state.lock().await.take(
                &self.stream_name,
                &self.consumer_name,
                request.batch_size,
                now,
            )?;

            if !taken.is_empty() {
                return Ok(taken
                    .into_iter()
                    .map(|taken| self.delivery(taken))
                    .collect());
            }

            if now >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }
}

impl MemoryPull {
    fn delivery(&self, Taken { sequence, delivered, message }: Taken) -> MemoryDelivery {
        MemoryDelivery {
            consumer_name: self.consumer_name.clone(),
            delivered,
            msg_id: message.msg_id,
            payload: message.payload,
            sequence,
            shared: self.shared.clone(),
            stream_name: self.stream_name.clone(),
            subject: message.subject,
        }
    }
}

/// A message delivered by a [`MemoryPull`].
#[derive(Debug)]
pub struct MemoryDelivery {
    consumer_name: String,
    delivered: u64,
    msg_id: Option<String>,
    payload: Bytes,
    sequence: u64,
    shared: Arc<Shared>,
    stream_name: String,
    subject: String,
}

#[async_trait]
impl Delivery for MemoryDelivery {
    type Error = Error;

    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    fn msg_id(&self) -> Option<&str> {
        self.msg_id.as_deref()
    }

    fn stream_sequence(&self) -> u64 {
        self.sequence
    }

    fn delivered(&self) -> u64 {
        self.delivered
    }

    async fn ack(&self) -> Result<(), Self::Error> {
        self.shared.state.lock().await.ack(
            &self.stream_name,
            &self.consumer_name,
            self.sequence,
        )?;
        self.shared.notify.notify_waiters();

        Ok(())
    }

    async fn nak(&self) -> Result<(), Self::Error> {
        self.shared.state.lock().await.nak(
            &self.stream_name,
            &self.consumer_name,
            self.sequence,
        )?;
        self.shared.notify.notify_waiters();

        Ok(())
    }

    async fn term(&self) -> Result<(), Self::Error> {
        self.ack().await
    }
}
