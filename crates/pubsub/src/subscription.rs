use crate::broker::{Broker, Delivery, PullHandle};
use crate::config::{ConsumerInfo, DEFAULT_ACK_WAIT, FetchRequest};
use crate::error::Error;
use crate::handler::{Message, SubscriptionHandler};
use crate::mode::SubscriptionMode;

use std::error::Error as StdError;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// Default maximum number of messages pulled at once.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default time a pull waits for the first message.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(1);

const FETCH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Options for new subscriptions.
#[derive(Clone, Debug)]
pub struct SubscriptionOptions {
    /// The subject to subscribe to. Its first token names the stream.
    pub subject: String,

    /// Durable name of the consumer. Must be stable across restarts.
    pub consumer_name: String,

    /// Ordering mode of the consumer.
    pub mode: SubscriptionMode,

    /// Maximum number of messages pulled at once. Defaults to 10.
    pub batch_size: Option<usize>,

    /// How long a pull waits for the first message. Defaults to 1 second.
    pub fetch_timeout: Option<Duration>,
}

impl SubscriptionOptions {
    /// Options with default tunables.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        consumer_name: impl Into<String>,
        mode: SubscriptionMode,
    ) -> Self {
        Self {
            subject: subject.into(),
            consumer_name: consumer_name.into(),
            mode,
            batch_size: None,
            fetch_timeout: None,
        }
    }
}

/// Lifecycle of a subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubscriptionState {
    /// Consumer reconciled and pull handle bound; not consuming yet.
    Bound,

    /// Waiting for the next batch.
    Fetching,

    /// Handing a batch to the handler.
    Dispatching,

    /// Closed; no further fetches.
    Drained,
}

/// A subscription bound to a durable consumer.
///
/// Cloning yields another handle to the same subscription.
#[derive(Debug)]
pub struct Subscription<B>
where
    B: Broker,
{
    ack_wait: Duration,
    batch_size: usize,
    consumer: ConsumerInfo,
    fetch_timeout: Duration,
    mode: SubscriptionMode,
    pull: Arc<B::Pull>,
    shutdown_token: CancellationToken,
    started: Arc<AtomicBool>,
    state: Arc<watch::Sender<SubscriptionState>>,
    subject: String,
    task_tracker: TaskTracker,
}

impl<B> Clone for Subscription<B>
where
    B: Broker,
{
    fn clone(&self) -> Self {
        Self {
            ack_wait: self.ack_wait,
            batch_size: self.batch_size,
            consumer: self.consumer.clone(),
            fetch_timeout: self.fetch_timeout,
            mode: self.mode,
            pull: self.pull.clone(),
            shutdown_token: self.shutdown_token.clone(),
            started: self.started.clone(),
            state: self.state.clone(),
            subject: self.subject.clone(),
            task_tracker: self.task_tracker.clone(),
        }
    }
}

impl<B> Subscription<B>
where
    B: Broker,
{
    pub(crate) fn new(
        consumer: ConsumerInfo,
        options: SubscriptionOptions,
        pull: B::Pull,
        shutdown_token: CancellationToken,
        task_tracker: TaskTracker,
    ) -> Self {
        let (state, _) = watch::channel(SubscriptionState::Bound);

        let ack_wait = if consumer.config.ack_wait.is_zero() {
            DEFAULT_ACK_WAIT
        } else {
            consumer.config.ack_wait
        };

        Self {
            ack_wait,
            batch_size: options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
            consumer,
            fetch_timeout: options.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT),
            mode: options.mode,
            pull: Arc::new(pull),
            shutdown_token,
            started: Arc::new(AtomicBool::new(false)),
            state: Arc::new(state),
            subject: options.subject,
            task_tracker,
        }
    }

    /// The reconciled consumer backing this subscription.
    pub const fn consumer(&self) -> &ConsumerInfo {
        &self.consumer
    }

    /// The ordering mode of the subscription.
    pub const fn mode(&self) -> SubscriptionMode {
        self.mode
    }

    /// The subscribed subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// A receiver observing every state transition.
    pub fn state_changes(&self) -> watch::Receiver<SubscriptionState> {
        self.state.subscribe()
    }

    /// Starts pulling messages and dispatching them to `handler`.
    ///
    /// Messages are handed over one at a time in delivery order. A message is
    /// acknowledged when the handler succeeds and negatively acknowledged when
    /// it fails, panics or runs longer than the consumer's ack wait.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AlreadyStarted`] if the subscription was started
    /// before.
    pub fn start<X, T, D>(&self, handler: X) -> Result<(), Error<B::Error>>
    where
        X: SubscriptionHandler<T>,
        T: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = D> + 'static,
        D: Debug + Send + StdError + Sync + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }

        let worker = Worker {
            ack_wait: self.ack_wait,
            consumer_name: self.consumer.name.clone(),
            handler,
            pull: self.pull.clone(),
            request: FetchRequest {
                batch_size: self.batch_size,
                expires: self.fetch_timeout,
            },
            shutdown_token: self.shutdown_token.clone(),
            state: self.state.clone(),
            _marker: PhantomData,
        };

        self.task_tracker.spawn(worker.run());

        Ok(())
    }

    /// Stops fetching and waits for the message in flight to be acknowledged.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();

        if !self.started.load(Ordering::SeqCst) {
            self.state.send_replace(SubscriptionState::Drained);
        }

        self.wait().await;
    }

    /// Waits until the subscription is drained.
    pub async fn wait(&self) {
        let mut receiver = self.state.subscribe();
        let _ = receiver
            .wait_for(|state| *state == SubscriptionState::Drained)
            .await;
    }
}

struct Worker<P, X, T>
where
    P: PullHandle,
{
    ack_wait: Duration,
    consumer_name: String,
    handler: X,
    pull: Arc<P>,
    request: FetchRequest,
    shutdown_token: CancellationToken,
    state: Arc<watch::Sender<SubscriptionState>>,
    _marker: PhantomData<T>,
}

impl<P, X, T, D> Worker<P, X, T>
where
    P: PullHandle,
    X: SubscriptionHandler<T>,
    T: Clone + Debug + Send + Sync + TryFrom<Bytes, Error = D> + 'static,
    D: Debug + Send + StdError + Sync + 'static,
{
    async fn run(self) {
        let _drained = DrainedOnExit(self.state.clone());

        debug!(consumer = %self.consumer_name, "subscription started");

        while !self.shutdown_token.is_cancelled() {
            self.state.send_replace(SubscriptionState::Fetching);

            let fetched = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => break,
                fetched = self.pull.fetch(self.request) => fetched,
            };

            let deliveries = match fetched {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    warn!(
                        consumer = %self.consumer_name,
                        error = %e,
                        "failed to fetch messages, retrying"
                    );

                    tokio::select! {
                        biased;
                        () = self.shutdown_token.cancelled() => break,
                        () = tokio::time::sleep(FETCH_RETRY_DELAY) => continue,
                    }
                }
            };

            if deliveries.is_empty() {
                continue;
            }

            self.state.send_replace(SubscriptionState::Dispatching);

            let mut deliveries = deliveries.into_iter();
            for delivery in deliveries.by_ref() {
                self.dispatch(delivery).await;

                if self.shutdown_token.is_cancelled() {
                    break;
                }
            }

            // Hand back what was fetched but never dispatched.
            for delivery in deliveries {
                if let Err(e) = delivery.nak().await {
                    error!(
                        consumer = %self.consumer_name,
                        stream_sequence = delivery.stream_sequence(),
                        error = %e,
                        "failed to release undispatched message"
                    );
                }
            }
        }

        debug!(consumer = %self.consumer_name, "subscription drained");
    }

    async fn dispatch(&self, delivery: P::Delivery) {
        let payload = match T::try_from(delivery.payload()) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    consumer = %self.consumer_name,
                    subject = %delivery.subject(),
                    stream_sequence = delivery.stream_sequence(),
                    error = %e,
                    "failed to deserialize message, terminating it"
                );

                if let Err(e) = delivery.term().await {
                    error!(
                        consumer = %self.consumer_name,
                        error = %e,
                        "failed to terminate message"
                    );
                }

                return;
            }
        };

        let message = Message {
            subject: delivery.subject().to_string(),
            msg_id: delivery.msg_id().map(ToString::to_string),
            payload,
            delivered: delivery.delivered(),
        };

        // A panicking handler fails only its own task.
        let handler = self.handler.clone();
        let mut handling = tokio::spawn(async move { handler.handle(message).await });

        let result = match tokio::time::timeout(self.ack_wait, &mut handling).await {
            Ok(Ok(Ok(()))) => delivery.ack().await,
            Ok(Ok(Err(e))) => {
                warn!(
                    consumer = %self.consumer_name,
                    subject = %delivery.subject(),
                    delivered = delivery.delivered(),
                    error = %e,
                    "handler failed, message will be redelivered"
                );

                delivery.nak().await
            }
            Ok(Err(e)) => {
                error!(
                    consumer = %self.consumer_name,
                    subject = %delivery.subject(),
                    delivered = delivery.delivered(),
                    error = %e,
                    "handler panicked, message will be redelivered"
                );

                delivery.nak().await
            }
            Err(_) => {
                handling.abort();

                warn!(
                    consumer = %self.consumer_name,
                    subject = %delivery.subject(),
                    delivered = delivery.delivered(),
                    ack_wait = ?self.ack_wait,
                    "handler timed out, message will be redelivered"
                );

                delivery.nak().await
            }
        };

        if let Err(e) = result {
            error!(
                consumer = %self.consumer_name,
                stream_sequence = delivery.stream_sequence(),
                error = %e,
                "failed to acknowledge message"
            );
        }
    }
}

/// Marks the subscription drained when the worker exits, including by panic.
struct DrainedOnExit(Arc<watch::Sender<SubscriptionState>>);

impl Drop for DrainedOnExit {
    fn drop(&mut self) {
        self.0.send_replace(SubscriptionState::Drained);
    }
}
