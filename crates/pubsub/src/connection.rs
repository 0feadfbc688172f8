use crate::broker::Broker;
use crate::config::{PublishAck, StreamConfig, StreamInfo};
use crate::error::Error;
use crate::mode::SubscriptionMode;
use crate::publisher::{Publisher, PublisherOptions};
use crate::reconciler::Reconciler;
use crate::subject;
use crate::subscription::{Subscription, SubscriptionOptions};

use std::error::Error as StdError;
use std::fmt::Debug;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// A connection to a broker.
///
/// Owns the broker bridge and every subscription worker started through it.
/// Cloning yields another handle to the same connection.
#[derive(Clone, Debug)]
pub struct Connection<B>
where
    B: Broker,
{
    broker: B,
    reconciler: Reconciler<B>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl<B> Connection<B>
where
    B: Broker,
{
    /// Creates a connection over an already connected broker.
    pub fn new(broker: B) -> Self {
        Self {
            reconciler: Reconciler::new(broker.clone()),
            broker,
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// The underlying broker.
    pub const fn broker(&self) -> &B {
        &self.broker
    }

    /// Returns the stream described by `config`, creating it if needed.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::get_or_add_stream`].
    pub async fn get_or_add_stream(
        &self,
        config: StreamConfig,
    ) -> Result<StreamInfo, Error<B::Error>> {
        self.reconciler.get_or_add_stream(config).await
    }

    /// Subscribes to `subject` through the durable consumer `consumer_name`
    /// using default tunables.
    ///
    /// # Errors
    ///
    /// See [`Connection::subscribe`].
    pub async fn create_subscription(
        &self,
        subject: &str,
        consumer_name: &str,
        mode: SubscriptionMode,
    ) -> Result<Subscription<B>, Error<B::Error>> {
        self.subscribe(SubscriptionOptions::new(subject, consumer_name, mode))
            .await
    }

    /// Reconciles the durable consumer for `options` and binds a subscription
    /// to it. The subscription does nothing until started.
    ///
    /// # Errors
    ///
    /// Fails if the subject does not name a stream, if reconciliation fails
    /// (including [`Error::ConfigurationDrift`]), or if binding fails. No
    /// subscription exists after a failure.
    pub async fn subscribe(
        &self,
        options: SubscriptionOptions,
    ) -> Result<Subscription<B>, Error<B::Error>> {
        let stream_name = subject::stream_name::<B::Error>(&options.subject)?;

        let consumer = self
            .reconciler
            .reconcile(
                stream_name,
                &options.consumer_name,
                options.mode,
                Some(&options.subject),
            )
            .await?;

        let pull = self
            .broker
            .bind(stream_name, &options.consumer_name)
            .await
            .map_err(Error::Transport)?;

        debug!(
            stream = %stream_name,
            consumer = %options.consumer_name,
            subject = %options.subject,
            mode = %options.mode,
            "subscription bound"
        );

        Ok(Subscription::new(
            consumer,
            options,
            pull,
            self.shutdown_token.child_token(),
            self.task_tracker.clone(),
        ))
    }

    /// Creates a publisher for a stream, creating the stream if needed.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::get_or_add_stream`].
    pub async fn new_publisher<T, S>(
        &self,
        PublisherOptions {
            stream_name,
            duplicate_window,
        }: PublisherOptions,
    ) -> Result<Publisher<B, T, S>, Error<B::Error>>
    where
        T: Clone + Debug + Send + Sync + TryInto<Bytes, Error = S> + 'static,
        S: Debug + Send + StdError + Sync + 'static,
    {
        let mut config = StreamConfig::new(stream_name.clone());
        if let Some(duplicate_window) = duplicate_window {
            config = config.with_duplicate_window(duplicate_window);
        }

        self.get_or_add_stream(config).await?;

        Ok(Publisher::new(self.broker.clone(), stream_name))
    }

    /// Publishes raw bytes with a deduplication identifier.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::EmptyMsgId`] for an empty identifier and with
    /// [`Error::Transport`] if the broker rejects the publish.
    pub async fn publish_msg(
        &self,
        subject: &str,
        msg_id: &str,
        payload: Bytes,
    ) -> Result<PublishAck, Error<B::Error>> {
        if msg_id.is_empty() {
            return Err(Error::EmptyMsgId);
        }

        self.broker
            .publish(subject, msg_id, payload)
            .await
            .map_err(Error::Transport)
    }

    /// The servers the broker is, or may be, connected to.
    pub fn servers(&self) -> Vec<String> {
        self.broker.servers()
    }

    /// Deletes a stream and its consumers.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Transport`] if the broker rejects the deletion.
    pub async fn delete_stream(&self, stream_name: &str) -> Result<(), Error<B::Error>> {
        self.broker
            .delete_stream(stream_name)
            .await
            .map_err(Error::Transport)
    }

    /// Stops every subscription, waits for in-flight messages to be
    /// acknowledged, then drains and closes the broker connection.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Transport`] if the broker fails to drain.
    pub async fn drain(&self) -> Result<(), Error<B::Error>> {
        info!("draining connection");

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        self.broker.drain().await.map_err(Error::Transport)?;

        info!("connection drained");

        Ok(())
    }
}
