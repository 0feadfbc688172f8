#![allow(dead_code)]

use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use durable_pubsub::{HandlerError, Message, SubscriptionHandler};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

pub const STREAM: &str = "orders";

#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Order {
    pub id: u32,
    pub item: String,
}

impl Order {
    pub fn new(id: u32, item: &str) -> Self {
        Self {
            id,
            item: item.to_string(),
        }
    }
}

impl TryFrom<Bytes> for Order {
    type Error = serde_json::Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes)
    }
}

impl TryFrom<Order> for Bytes {
    type Error = serde_json::Error;

    fn try_from(order: Order) -> Result<Self, Self::Error> {
        serde_json::to_vec(&order).map(Self::from)
    }
}

#[derive(Debug, Clone)]
pub struct TestHandlerError;

impl Display for TestHandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "TestHandlerError")
    }
}

impl StdError for TestHandlerError {}

impl HandlerError for TestHandlerError {}

/// Forwards every message it sees and fails the first `failures` attempts of
/// messages with the given payload.
#[derive(Clone, Debug)]
pub struct RecordingHandler<T> {
    fail_on: Option<T>,
    failures: Arc<AtomicUsize>,
    sender: mpsc::Sender<(Message<T>, bool)>,
}

impl<T> RecordingHandler<T>
where
    T: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> (Self, mpsc::Receiver<(Message<T>, bool)>) {
        let (sender, receiver) = mpsc::channel(100);

        (
            Self {
                fail_on: None,
                failures: Arc::new(AtomicUsize::new(0)),
                sender,
            },
            receiver,
        )
    }

    pub fn failing(payload: T, failures: usize) -> (Self, mpsc::Receiver<(Message<T>, bool)>) {
        let (mut handler, receiver) = Self::new();
        handler.fail_on = Some(payload);
        handler.failures = Arc::new(AtomicUsize::new(failures));

        (handler, receiver)
    }
}

#[async_trait]
impl<T> SubscriptionHandler<T> for RecordingHandler<T>
where
    T: Clone + std::fmt::Debug + PartialEq + Send + Sync + 'static,
{
    type Error = TestHandlerError;

    async fn handle(&self, message: Message<T>) -> Result<(), Self::Error> {
        let fail = self.fail_on.as_ref() == Some(&message.payload)
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();

        self.sender
            .send((message, !fail))
            .await
            .map_err(|_| TestHandlerError)?;

        if fail { Err(TestHandlerError) } else { Ok(()) }
    }
}

/// Forwards every message and panics on its first delivery.
#[derive(Clone, Debug)]
pub struct PanickingHandler<T> {
    sender: mpsc::Sender<(Message<T>, bool)>,
}

impl<T> PanickingHandler<T>
where
    T: Clone + std::fmt::Debug + Send + Sync + 'static,
{
    pub fn new() -> (Self, mpsc::Receiver<(Message<T>, bool)>) {
        let (sender, receiver) = mpsc::channel(100);

        (Self { sender }, receiver)
    }
}

#[async_trait]
impl<T> SubscriptionHandler<T> for PanickingHandler<T>
where
    T: Clone + std::fmt::Debug + Send + Sync + 'static,
{
    type Error = TestHandlerError;

    async fn handle(&self, message: Message<T>) -> Result<(), Self::Error> {
        let first = message.delivered == 1;

        self.sender
            .send((message, !first))
            .await
            .map_err(|_| TestHandlerError)?;

        if first {
            panic!("handler crashed on first delivery");
        }

        Ok(())
    }
}

/// Forwards every message as soon as it arrives, then sleeps before
/// succeeding. Counts the messages it finished.
#[derive(Clone, Debug)]
pub struct SlowHandler<T> {
    completed: Arc<AtomicUsize>,
    delay: Duration,
    first_delivery_only: bool,
    sender: mpsc::Sender<(Message<T>, bool)>,
}

impl<T> SlowHandler<T>
where
    T: Clone + std::fmt::Debug + Send + Sync + 'static,
{
    pub fn new(delay: Duration) -> (Self, mpsc::Receiver<(Message<T>, bool)>) {
        let (sender, receiver) = mpsc::channel(100);

        (
            Self {
                completed: Arc::new(AtomicUsize::new(0)),
                delay,
                first_delivery_only: false,
                sender,
            },
            receiver,
        )
    }

    /// Sleeps on first deliveries only; redeliveries complete at once.
    pub fn first_delivery(delay: Duration) -> (Self, mpsc::Receiver<(Message<T>, bool)>) {
        let (mut handler, receiver) = Self::new(delay);
        handler.first_delivery_only = true;

        (handler, receiver)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> SubscriptionHandler<T> for SlowHandler<T>
where
    T: Clone + std::fmt::Debug + Send + Sync + 'static,
{
    type Error = TestHandlerError;

    async fn handle(&self, message: Message<T>) -> Result<(), Self::Error> {
        let stall = !self.first_delivery_only || message.delivered == 1;

        self.sender
            .send((message, true))
            .await
            .map_err(|_| TestHandlerError)?;

        if stall {
            tokio::time::sleep(self.delay).await;
        }

        self.completed.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

/// Receives the next `(message, succeeded)` pair or panics after a second.
pub async fn next<T>(receiver: &mut mpsc::Receiver<(Message<T>, bool)>) -> (Message<T>, bool) {
    timeout(Duration::from_secs(1), receiver.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("handler channel closed")
}

/// Asserts nothing else arrives within a short grace period.
pub async fn assert_quiet<T>(receiver: &mut mpsc::Receiver<(Message<T>, bool)>)
where
    T: std::fmt::Debug,
{
    if let Ok(Some(extra)) = timeout(Duration::from_millis(200), receiver.recv()).await {
        panic!("unexpected message: {extra:?}");
    }
}
