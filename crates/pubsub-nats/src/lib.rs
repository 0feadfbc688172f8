//! NATS `JetStream` implementation of the durable pubsub broker.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod convert;
mod error;
mod pull;

pub use error::Error;
pub use pull::{NatsDelivery, NatsPull};

use std::time::Duration;

use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::consumer::pull::Config as NatsPullConfig;
use async_nats::{Client, ConnectOptions, Event, HeaderMap, header::NATS_MESSAGE_ID};
use async_trait::async_trait;
use bytes::Bytes;
use durable_pubsub::Broker;
use durable_pubsub::config::{
    ConsumerConfig, ConsumerInfo, PublishAck, StreamConfig, StreamInfo,
};
use tracing::{debug, error, info, warn};

/// Default timeout for establishing the connection.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for connecting to NATS.
#[derive(Clone, Debug)]
pub struct NatsBrokerOptions {
    /// Server URLs, e.g. `nats://localhost:4222`.
    pub servers: Vec<String>,

    /// Connection name reported to the server.
    pub name: Option<String>,

    /// Timeout for establishing the connection. Defaults to 5 seconds if not set.
    pub connection_timeout: Option<Duration>,
}

/// A broker backed by NATS `JetStream`.
#[derive(Clone, Debug)]
pub struct NatsBroker {
    client: Client,
    jetstream_context: JetStreamContext,
    servers: Vec<String>,
}

impl NatsBroker {
    /// Connects to the configured servers and logs connection state changes.
    ///
    /// # Errors
    ///
    /// Returns an error if no servers are configured or the client fails to
    /// connect.
    pub async fn connect(
        NatsBrokerOptions {
            servers,
            name,
            connection_timeout,
        }: NatsBrokerOptions,
    ) -> Result<Self, Error> {
        if servers.is_empty() {
            return Err(Error::NoServers);
        }

        let mut connect_options = ConnectOptions::new()
            .connection_timeout(connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT))
            .event_callback(|event| async move {
                match event {
                    Event::Connected => info!("connected to NATS"),
                    Event::Disconnected => error!("disconnected from NATS"),
                    Event::Closed => info!("NATS connection closed"),
                    other => warn!(event = %other, "NATS connection event"),
                }
            });

        if let Some(name) = name {
            connect_options = connect_options.name(name);
        }

        let addresses = servers.join(",");
        let client = async_nats::connect_with_options(addresses.as_str(), connect_options).await?;

        info!(servers = %addresses, "connected to NATS");

        Ok(Self::new(client, servers))
    }

    /// Wraps an already connected client.
    #[must_use]
    pub fn new(client: Client, servers: Vec<String>) -> Self {
        Self {
            jetstream_context: async_nats::jetstream::new(client.clone()),
            client,
            servers,
        }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Broker for NatsBroker {
    type Error = Error;

    type Pull = NatsPull;

    async fn stream_info(&self, stream_name: &str) -> Result<StreamInfo, Self::Error> {
        let stream = self
            .jetstream_context
            .get_stream(stream_name)
            .await
            .map_err(|e| Error::StreamInfo(e.kind()))?;

        Ok(convert::stream_info(stream.cached_info()))
    }

    async fn add_stream(&self, config: StreamConfig) -> Result<StreamInfo, Self::Error> {
        let stream = self
            .jetstream_context
            .create_stream(convert::stream_config(config))
            .await
            .map_err(|e| Error::StreamCreate(e.kind()))?;

        Ok(convert::stream_info(stream.cached_info()))
    }

    async fn delete_stream(&self, stream_name: &str) -> Result<(), Self::Error> {
        self.jetstream_context
            .delete_stream(stream_name)
            .await
            .map_err(|e| Error::StreamDelete(e.kind()))?;

        debug!(stream = %stream_name, "deleted stream");

        Ok(())
    }

    async fn consumer_info(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<ConsumerInfo, Self::Error> {
        let consumer = self
            .jetstream_context
            .get_consumer_from_stream::<NatsPullConfig, _, _>(consumer_name, stream_name)
            .await
            .map_err(|e| Error::ConsumerInfo(e.kind()))?;

        Ok(convert::consumer_info(consumer.cached_info()))
    }

    async fn add_consumer(
        &self,
        stream_name: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, Self::Error> {
        let consumer = self
            .jetstream_context
            .create_consumer_on_stream(convert::consumer_config(config), stream_name)
            .await
            .map_err(|e| Error::ConsumerCreate(e.kind()))?;

        Ok(convert::consumer_info(consumer.cached_info()))
    }

    async fn bind(&self, stream_name: &str, consumer_name: &str) -> Result<NatsPull, Self::Error> {
        let consumer = self
            .jetstream_context
            .get_consumer_from_stream::<NatsPullConfig, _, _>(consumer_name, stream_name)
            .await
            .map_err(|e| Error::ConsumerInfo(e.kind()))?;

        Ok(NatsPull::new(consumer, consumer_name.to_string()))
    }

    async fn publish(
        &self,
        subject: &str,
        msg_id: &str,
        payload: Bytes,
    ) -> Result<PublishAck, Self::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(NATS_MESSAGE_ID, msg_id);

        let ack = self
            .jetstream_context
            .publish_with_headers(subject.to_string(), headers, payload)
            .await
            .map_err(|e| Error::Publish(e.kind()))?
            .await
            .map_err(|e| Error::Publish(e.kind()))?;

        Ok(PublishAck {
            stream: ack.stream,
            sequence: ack.sequence,
            duplicate: ack.duplicate,
        })
    }

    fn servers(&self) -> Vec<String> {
        let mut servers = self.servers.clone();

        for url in self.client.server_info().connect_urls {
            let url = if url.contains("://") {
                url
            } else {
                format!("nats://{url}")
            };

            if !servers.contains(&url) {
                servers.push(url);
            }
        }

        servers
    }

    async fn drain(&self) -> Result<(), Self::Error> {
        info!("draining NATS client");

        self.client
            .drain()
            .await
            .map_err(|e| Error::Drain(e.into()))
    }
}
