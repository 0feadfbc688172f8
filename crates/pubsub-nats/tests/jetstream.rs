//! These tests need a `JetStream` enabled server on `localhost:4222`.

use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use durable_pubsub::{
    Broker, BrokerError, Connection, Error, HandlerError, Message, PublisherOptions,
    SubscriptionHandler, SubscriptionMode,
};
use durable_pubsub_nats::{NatsBroker, NatsBrokerOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct Greeting {
    text: String,
}

impl TryFrom<Bytes> for Greeting {
    type Error = serde_json::Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes)
    }
}

impl TryFrom<Greeting> for Bytes {
    type Error = serde_json::Error;

    fn try_from(greeting: Greeting) -> Result<Self, Self::Error> {
        serde_json::to_vec(&greeting).map(Self::from)
    }
}

#[derive(Debug, Clone)]
struct TestHandlerError;

impl Display for TestHandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "TestHandlerError")
    }
}

impl StdError for TestHandlerError {}

impl HandlerError for TestHandlerError {}

#[derive(Clone, Debug)]
struct TestHandler(mpsc::Sender<Greeting>);

#[async_trait]
impl SubscriptionHandler<Greeting> for TestHandler {
    type Error = TestHandlerError;

    async fn handle(&self, message: Message<Greeting>) -> Result<(), Self::Error> {
        self.0
            .send(message.payload)
            .await
            .map_err(|_| TestHandlerError)
    }
}

fn unique_stream() -> String {
    format!("test{}", uuid::Uuid::new_v4().simple())
}

async fn connect() -> Connection<NatsBroker> {
    let broker = NatsBroker::connect(NatsBrokerOptions {
        servers: vec!["nats://localhost:4222".to_string()],
        name: Some("durable-pubsub-tests".to_string()),
        connection_timeout: None,
    })
    .await
    .unwrap();

    Connection::new(broker)
}

#[tokio::test]
#[ignore = "requires a NATS server on localhost:4222"]
async fn test_hello_world_in_order() {
    let connection = connect().await;
    let stream = unique_stream();
    let subject = format!("{stream}.greetings");

    let publisher = connection
        .new_publisher::<Greeting, serde_json::Error>(PublisherOptions {
            stream_name: stream.clone(),
            duplicate_window: None,
        })
        .await
        .unwrap();

    let subscription = connection
        .create_subscription(
            &subject,
            "greeter",
            SubscriptionMode::SingleInstanceMessagesInOrder,
        )
        .await
        .unwrap();
    assert_eq!(subscription.consumer().config.max_ack_pending, 1);

    let (sender, mut receiver) = mpsc::channel(10);
    subscription.start(TestHandler(sender)).unwrap();

    for text in ["hello", "world"] {
        let greeting = Greeting {
            text: text.to_string(),
        };
        publisher.publish(&subject, text, greeting).await.unwrap();
    }

    for expected in ["hello", "world"] {
        let greeting = timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(greeting.text, expected);
    }

    connection.delete_stream(&stream).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a NATS server on localhost:4222"]
async fn test_mode_change_is_configuration_drift() {
    let connection = connect().await;
    let stream = unique_stream();
    let subject = format!("{stream}.events");

    connection
        .get_or_add_stream(durable_pubsub::StreamConfig::new(stream.clone()))
        .await
        .unwrap();
    connection
        .create_subscription(&subject, "C", SubscriptionMode::MultipleInstances)
        .await
        .unwrap();

    assert_matches!(
        connection
            .create_subscription(&subject, "C", SubscriptionMode::SingleInstanceMessagesInOrder)
            .await,
        Err(Error::ConfigurationDrift { .. })
    );

    connection.delete_stream(&stream).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a NATS server on localhost:4222"]
async fn test_duplicate_msg_id_is_acknowledged_as_duplicate() {
    let connection = connect().await;
    let stream = unique_stream();
    let subject = format!("{stream}.events");

    connection
        .get_or_add_stream(durable_pubsub::StreamConfig::new(stream.clone()))
        .await
        .unwrap();

    let first = connection
        .publish_msg(&subject, "msg-0", Bytes::from("once"))
        .await
        .unwrap();
    let second = connection
        .publish_msg(&subject, "msg-0", Bytes::from("once"))
        .await
        .unwrap();

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.sequence, second.sequence);

    connection.delete_stream(&stream).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a NATS server on localhost:4222"]
async fn test_missing_stream_is_not_found() {
    let connection = connect().await;

    let error = connection
        .broker()
        .stream_info(&unique_stream())
        .await
        .unwrap_err();

    assert!(error.is_not_found());
    assert!(!connection.servers().is_empty());
}
