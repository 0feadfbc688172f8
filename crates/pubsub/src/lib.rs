//! Durable publish/subscribe on top of a persistent streaming broker.
//!
//! Subscriptions are backed by durable consumers whose ordering semantics are
//! chosen with a [`SubscriptionMode`]. Consumers are reconciled idempotently on
//! every subscribe, and a request that would silently change the ordering
//! semantics of an existing consumer is rejected as configuration drift.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// The broker boundary implemented by concrete transports.
pub mod broker;

/// Stream and consumer configuration.
pub mod config;

/// Connections own a broker and hand out publishers and subscriptions.
pub mod connection;

mod error;

/// Handlers process messages delivered to subscriptions.
pub mod handler;

/// Ordering modes and their consumer policy.
pub mod mode;

/// Publishers attach deduplication identifiers to outgoing messages.
pub mod publisher;

/// Idempotent creation and drift checking of streams and consumers.
pub mod reconciler;

/// Subject parsing and matching.
pub mod subject;

/// Subscriptions pull from durable consumers and acknowledge by handler outcome.
pub mod subscription;

pub use broker::{Broker, BrokerError, Delivery, PullHandle};
pub use config::{AckPolicy, ConsumerConfig, StreamConfig};
pub use connection::Connection;
pub use error::Error;
pub use handler::{HandlerError, Message, SubscriptionHandler};
pub use mode::SubscriptionMode;
pub use publisher::{Publisher, PublisherOptions};
pub use reconciler::Reconciler;
pub use subscription::{Subscription, SubscriptionOptions, SubscriptionState};
