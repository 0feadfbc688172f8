use crate::error::Error;

use async_nats::header::NATS_MESSAGE_ID;
use async_nats::jetstream::AckKind;
use async_nats::jetstream::Message as NatsMessage;
use async_nats::jetstream::consumer::Consumer as NatsConsumer;
use async_nats::jetstream::consumer::pull::{Batch, Config as NatsPullConfig};
use async_trait::async_trait;
use bytes::Bytes;
use durable_pubsub::config::FetchRequest;
use durable_pubsub::{Delivery, PullHandle};
use futures::StreamExt;
use tracing::warn;

/// A pull handle bound to a durable `JetStream` consumer.
#[derive(Debug)]
pub struct NatsPull {
    consumer: NatsConsumer<NatsPullConfig>,
    consumer_name: String,
}

impl NatsPull {
    pub(crate) const fn new(consumer: NatsConsumer<NatsPullConfig>, consumer_name: String) -> Self {
        Self {
            consumer,
            consumer_name,
        }
    }

    async fn collect(&self, mut batch: Batch) -> Vec<NatsDelivery> {
        let mut deliveries = Vec::new();

        while let Some(message) = batch.next().await {
            match message {
                Ok(message) => deliveries.push(NatsDelivery::new(message)),
                Err(e) => {
                    warn!(
                        consumer = %self.consumer_name,
                        error = %e,
                        "skipping bad message in batch"
                    );
                }
            }
        }

        deliveries
    }
}

#[async_trait]
impl PullHandle for NatsPull {
    type Error = Error;

    type Delivery = NatsDelivery;

    async fn fetch(&self, request: FetchRequest) -> Result<Vec<NatsDelivery>, Self::Error> {
        // Take whatever is ready without waiting.
        let ready = self
            .consumer
            .fetch()
            .max_messages(request.batch_size)
            .messages()
            .await
            .map_err(|e| Error::Fetch(e.kind()))?;

        let deliveries = self.collect(ready).await;
        if !deliveries.is_empty() {
            return Ok(deliveries);
        }

        // Nothing ready: wait for the first message up to the timeout.
        let waiting = self
            .consumer
            .batch()
            .max_messages(1)
            .expires(request.expires)
            .messages()
            .await
            .map_err(|e| Error::Fetch(e.kind()))?;

        Ok(self.collect(waiting).await)
    }
}

/// A message delivered from a `JetStream` consumer.
#[derive(Debug)]
pub struct NatsDelivery {
    delivered: u64,
    message: NatsMessage,
    msg_id: Option<String>,
    stream_sequence: u64,
    subject: String,
}

impl NatsDelivery {
    fn new(message: NatsMessage) -> Self {
        let (stream_sequence, delivered) = message.info().map_or((0, 1), |info| {
            (
                info.stream_sequence,
                u64::try_from(info.delivered).unwrap_or(1),
            )
        });

        let msg_id = message
            .headers
            .as_ref()
            .and_then(|headers| headers.get(NATS_MESSAGE_ID))
            .map(|value| value.as_str().to_string());

        Self {
            delivered,
            msg_id,
            stream_sequence,
            subject: message.subject.to_string(),
            message,
        }
    }
}

#[async_trait]
impl Delivery for NatsDelivery {
    type Error = Error;

    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> Bytes {
        self.message.payload.clone()
    }

    fn msg_id(&self) -> Option<&str> {
        self.msg_id.as_deref()
    }

    fn stream_sequence(&self) -> u64 {
        self.stream_sequence
    }

    fn delivered(&self) -> u64 {
        self.delivered
    }

    async fn ack(&self) -> Result<(), Self::Error> {
        self.message
            .ack()
            .await
            .map_err(Error::Ack)
    }

    async fn nak(&self) -> Result<(), Self::Error> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(Error::Ack)
    }

    async fn term(&self) -> Result<(), Self::Error> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(Error::Ack)
    }
}
