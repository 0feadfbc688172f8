//! Publishes a few messages and consumes them in order.
//!
//! Run against a local `JetStream` server:
//! `cargo run -p durable-pubsub-nats --example pubsub`

use std::error::Error as StdError;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use durable_pubsub::{
    Connection, HandlerError, Message, PublisherOptions, SubscriptionHandler, SubscriptionMode,
};
use durable_pubsub_nats::{NatsBroker, NatsBrokerOptions};
use tracing::info;

#[derive(Debug, Clone)]
struct PrintError;

impl Display for PrintError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "PrintError")
    }
}

impl StdError for PrintError {}

impl HandlerError for PrintError {}

#[derive(Clone, Debug)]
struct PrintHandler;

#[async_trait]
impl SubscriptionHandler for PrintHandler {
    type Error = PrintError;

    async fn handle(&self, message: Message) -> Result<(), Self::Error> {
        info!(
            subject = %message.subject,
            msg_id = ?message.msg_id,
            delivered = message.delivered,
            payload = %String::from_utf8_lossy(&message.payload),
            "received"
        );

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    tracing_subscriber::fmt::init();

    let broker = NatsBroker::connect(NatsBrokerOptions {
        servers: vec!["nats://localhost:4222".to_string()],
        name: Some("durable-pubsub-demo".to_string()),
        connection_timeout: None,
    })
    .await?;
    let connection = Connection::new(broker);

    let publisher = connection
        .new_publisher::<Bytes, _>(PublisherOptions {
            stream_name: "demo".to_string(),
            duplicate_window: None,
        })
        .await?;

    let subscription = connection
        .create_subscription(
            "demo.greetings",
            "demo-printer",
            SubscriptionMode::SingleInstanceMessagesInOrder,
        )
        .await?;
    subscription.start(PrintHandler)?;

    for (idx, text) in ["hello", "world"].into_iter().enumerate() {
        let ack = publisher
            .publish("demo.greetings", &format!("greeting-{idx}"), Bytes::from(text))
            .await?;
        info!(sequence = ack.sequence, duplicate = ack.duplicate, "published");
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    connection.drain().await?;

    Ok(())
}
