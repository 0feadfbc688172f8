use std::time::Duration;

use crate::mode::SubscriptionMode;
use crate::subject;

/// How long the broker waits for an acknowledgment before redelivering.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(30);

/// How long the broker remembers message identifiers for deduplication.
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(120);

/// How consumers acknowledge messages.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AckPolicy {
    /// Every message must be acknowledged individually.
    #[default]
    Explicit,

    /// Acknowledging a message acknowledges every message before it.
    All,

    /// Messages never need acknowledging.
    None,
}

/// Configuration of a stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamConfig {
    /// The stream name.
    pub name: String,

    /// Subject filters whose messages are stored in the stream.
    pub subjects: Vec<String>,

    /// Window in which a repeated message identifier is treated as a duplicate.
    pub duplicate_window: Duration,
}

impl StreamConfig {
    /// A stream capturing every subject whose first token is `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();

        Self {
            subjects: vec![subject::all_in_stream(&name)],
            name,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
        }
    }

    /// Overrides the deduplication window.
    #[must_use]
    pub const fn with_duplicate_window(mut self, duplicate_window: Duration) -> Self {
        self.duplicate_window = duplicate_window;
        self
    }
}

/// Configuration of a durable consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsumerConfig {
    /// The durable name of the consumer.
    pub durable_name: String,

    /// How messages are acknowledged.
    pub ack_policy: AckPolicy,

    /// How long to wait for an acknowledgment before redelivering.
    pub ack_wait: Duration,

    /// Maximum number of unacknowledged messages in flight. Zero is unbounded.
    pub max_ack_pending: i64,

    /// Only deliver messages whose subject matches this filter.
    pub filter_subject: Option<String>,
}

impl ConsumerConfig {
    /// The configuration this layer creates for a durable consumer in `mode`.
    #[must_use]
    pub fn durable(durable_name: impl Into<String>, mode: SubscriptionMode) -> Self {
        Self {
            durable_name: durable_name.into(),
            ack_policy: AckPolicy::Explicit,
            ack_wait: DEFAULT_ACK_WAIT,
            max_ack_pending: mode.max_ack_pending(),
            filter_subject: None,
        }
    }

    /// Restricts the consumer to a subject filter.
    #[must_use]
    pub fn with_filter_subject(mut self, filter_subject: impl Into<String>) -> Self {
        self.filter_subject = Some(filter_subject.into());
        self
    }

    /// The ordering mode implied by this configuration.
    #[must_use]
    pub const fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::from_max_ack_pending(self.max_ack_pending)
    }
}

/// State of a stream as reported by the broker.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    /// The stream configuration.
    pub config: StreamConfig,

    /// Number of messages stored.
    pub messages: u64,

    /// Sequence number of the last stored message.
    pub last_sequence: u64,
}

/// State of a durable consumer as reported by the broker.
#[derive(Clone, Debug)]
pub struct ConsumerInfo {
    /// The stream the consumer reads from.
    pub stream_name: String,

    /// The consumer name.
    pub name: String,

    /// The stored configuration.
    pub config: ConsumerConfig,

    /// Messages not yet delivered.
    pub num_pending: u64,

    /// Messages delivered but not yet acknowledged.
    pub num_ack_pending: u64,
}

/// Acknowledgment returned by the broker for a published message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishAck {
    /// The stream that stored the message.
    pub stream: String,

    /// Sequence number of the stored message.
    pub sequence: u64,

    /// Whether the message identifier was already seen within the duplicate
    /// window, in which case nothing new was stored.
    pub duplicate: bool,
}

/// Parameters of a single pull.
#[derive(Clone, Copy, Debug)]
pub struct FetchRequest {
    /// Maximum number of messages to return.
    pub batch_size: usize,

    /// How long to wait for the first message.
    pub expires: Duration,
}
