use crate::broker::{Broker, BrokerError};
use crate::config::{ConsumerConfig, ConsumerInfo, StreamConfig, StreamInfo};
use crate::error::Error;
use crate::mode::SubscriptionMode;

use tracing::debug;

/// Makes stream and consumer setup safe to repeat on every start.
///
/// Streams and consumers are created when absent and reused when present. A
/// durable consumer is never updated: if the stored ordering mode differs from
/// the requested one the call fails with [`Error::ConfigurationDrift`], and if
/// it filters on another subject with [`Error::SubjectMismatch`].
#[derive(Clone, Debug)]
pub struct Reconciler<B>
where
    B: Broker,
{
    broker: B,
}

impl<B> Reconciler<B>
where
    B: Broker,
{
    /// Creates a reconciler over the given broker.
    pub const fn new(broker: B) -> Self {
        Self { broker }
    }

    /// Returns the stream described by `config`, creating it if it does not
    /// exist. An existing stream is returned as is.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::StreamInfo`] if the lookup fails for any reason other
    /// than absence, and with [`Error::StreamCreate`] if creation is rejected.
    pub async fn get_or_add_stream(
        &self,
        config: StreamConfig,
    ) -> Result<StreamInfo, Error<B::Error>> {
        match self.broker.stream_info(&config.name).await {
            Ok(info) => Ok(info),
            Err(e) if e.is_not_found() => {
                debug!(stream = %config.name, "stream not found, creating");

                let stream = config.name.clone();
                let info = self
                    .broker
                    .add_stream(config)
                    .await
                    .map_err(|source| Error::StreamCreate {
                        stream: stream.clone(),
                        source,
                    })?;

                debug!(stream = %stream, "created stream");

                Ok(info)
            }
            Err(source) => Err(Error::StreamInfo {
                stream: config.name,
                source,
            }),
        }
    }

    /// Ensures a durable consumer named `consumer_name` exists on `stream_name`
    /// with the ordering semantics of `mode`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConsumerInfo`] if the lookup fails for a reason other than
    ///   absence. No creation is attempted.
    /// - [`Error::ConsumerCreate`] if the broker rejects the new consumer.
    /// - [`Error::ConfigurationDrift`] if the consumer exists with another mode.
    /// - [`Error::SubjectMismatch`] if the consumer exists with another filter
    ///   subject. A consumer without a filter accepts any subject.
    pub async fn reconcile(
        &self,
        stream_name: &str,
        consumer_name: &str,
        mode: SubscriptionMode,
        filter_subject: Option<&str>,
    ) -> Result<ConsumerInfo, Error<B::Error>> {
        match self.broker.consumer_info(stream_name, consumer_name).await {
            Ok(existing) => check_existing(existing, mode, filter_subject),
            Err(e) if e.is_not_found() => {
                let mut config = ConsumerConfig::durable(consumer_name, mode);
                if let Some(filter_subject) = filter_subject {
                    config = config.with_filter_subject(filter_subject);
                }

                self.add_consumer(stream_name, config, mode).await
            }
            Err(source) => Err(Error::ConsumerInfo {
                stream: stream_name.to_string(),
                consumer: consumer_name.to_string(),
                source,
            }),
        }
    }

    async fn add_consumer(
        &self,
        stream_name: &str,
        config: ConsumerConfig,
        mode: SubscriptionMode,
    ) -> Result<ConsumerInfo, Error<B::Error>> {
        let consumer_name = config.durable_name.clone();
        let filter_subject = config.filter_subject.clone();

        match self.broker.add_consumer(stream_name, config).await {
            Ok(info) => {
                debug!(
                    stream = %stream_name,
                    consumer = %info.name,
                    mode = %mode,
                    num_pending = info.num_pending,
                    num_ack_pending = info.num_ack_pending,
                    "created consumer"
                );

                Ok(info)
            }
            Err(source) => {
                // Another process may have created the consumer between lookup
                // and creation; its stored config decides the outcome.
                match self.broker.consumer_info(stream_name, &consumer_name).await {
                    Ok(existing) => check_existing(existing, mode, filter_subject.as_deref()),
                    Err(_) => Err(Error::ConsumerCreate {
                        stream: stream_name.to_string(),
                        consumer: consumer_name,
                        source,
                    }),
                }
            }
        }
    }
}

fn check_existing<E>(
    existing: ConsumerInfo,
    requested: SubscriptionMode,
    filter_subject: Option<&str>,
) -> Result<ConsumerInfo, Error<E>>
where
    E: BrokerError,
{
    let stored = existing.config.mode();

    if stored != requested {
        return Err(Error::ConfigurationDrift {
            consumer: existing.name,
            requested,
            existing: stored,
        });
    }

    // An unfiltered consumer accepts any subject.
    let bound = existing
        .config
        .filter_subject
        .as_deref()
        .filter(|bound| !bound.is_empty());

    if let Some((subject, bound)) = filter_subject
        .zip(bound)
        .filter(|(subject, bound)| subject != bound)
    {
        return Err(Error::SubjectMismatch {
            consumer: existing.name.clone(),
            requested: subject.to_string(),
            existing: bound.to_string(),
        });
    }

    debug!(
        stream = %existing.stream_name,
        consumer = %existing.name,
        mode = %stored,
        "reusing existing consumer"
    );

    Ok(existing)
}
