use crate::Error;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bytes::Bytes;
use durable_pubsub::config::{
    ConsumerConfig, ConsumerInfo, PublishAck, StreamConfig, StreamInfo,
};
use durable_pubsub::subject;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct BrokerState {
    streams: HashMap<String, StreamState>,
}

#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub subject: String,
    pub msg_id: Option<String>,
    pub payload: Bytes,
}

/// A message handed out by a fetch.
#[derive(Debug)]
pub struct Taken {
    pub sequence: u64,
    pub delivered: u64,
    pub message: StoredMessage,
}

#[derive(Debug)]
struct StreamState {
    config: StreamConfig,
    consumers: HashMap<String, ConsumerState>,
    last_sequence: u64,
    messages: BTreeMap<u64, StoredMessage>,
    msg_ids: HashMap<String, (Instant, u64)>,
}

#[derive(Debug)]
struct ConsumerState {
    config: ConsumerConfig,
    deliveries: HashMap<u64, u64>,
    next_sequence: u64,
    // sequence -> ack deadline
    pending: BTreeMap<u64, Instant>,
    redeliver: BTreeSet<u64>,
}

impl BrokerState {
    pub fn stream_info(&self, stream_name: &str) -> Result<StreamInfo, Error> {
        self.stream(stream_name).map(StreamState::info)
    }

    pub fn add_stream(&mut self, config: StreamConfig) -> Result<StreamInfo, Error> {
        if config.name.is_empty() || config.name.contains(['.', '*', '>']) {
            return Err(Error::InvalidConfig(format!(
                "invalid stream name {:?}",
                config.name
            )));
        }

        if let Some(existing) = self.streams.get(&config.name) {
            if existing.config == config {
                return Ok(existing.info());
            }
            return Err(Error::StreamExists(config.name));
        }

        let stream = StreamState {
            config,
            consumers: HashMap::new(),
            last_sequence: 0,
            messages: BTreeMap::new(),
            msg_ids: HashMap::new(),
        };
        let info = stream.info();
        self.streams.insert(stream.config.name.clone(), stream);

        Ok(info)
    }

    pub fn delete_stream(&mut self, stream_name: &str) -> Result<(), Error> {
        self.streams
            .remove(stream_name)
            .map(|_| ())
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))
    }

    pub fn consumer_info(
        &self,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<ConsumerInfo, Error> {
        let stream = self.stream(stream_name)?;

        stream
            .consumers
            .get(consumer_name)
            .map(|consumer| stream.consumer_info(consumer))
            .ok_or_else(|| Error::ConsumerNotFound {
                stream: stream_name.to_string(),
                consumer: consumer_name.to_string(),
            })
    }

    pub fn consumer_names(&self, stream_name: &str) -> Result<Vec<String>, Error> {
        let mut names: Vec<String> = self
            .stream(stream_name)?
            .consumers
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn add_consumer(
        &mut self,
        stream_name: &str,
        config: ConsumerConfig,
    ) -> Result<ConsumerInfo, Error> {
        if config.durable_name.is_empty() {
            return Err(Error::InvalidConfig(
                "durable name must not be empty".to_string(),
            ));
        }

        if config.max_ack_pending < 0 {
            return Err(Error::InvalidConfig(format!(
                "max ack pending must not be negative, got {}",
                config.max_ack_pending
            )));
        }

        let stream = self.stream_mut(stream_name)?;

        if let Some(existing) = stream.consumers.get(&config.durable_name) {
            if existing.config == config {
                return Ok(stream.consumer_info(existing));
            }
            return Err(Error::ConsumerExists {
                stream: stream_name.to_string(),
                consumer: config.durable_name,
            });
        }

        let name = config.durable_name.clone();
        let consumer = ConsumerState {
            config,
            deliveries: HashMap::new(),
            next_sequence: 1,
            pending: BTreeMap::new(),
            redeliver: BTreeSet::new(),
        };
        let info = stream.consumer_info(&consumer);
        stream.consumers.insert(name, consumer);

        Ok(info)
    }

    pub fn publish(
        &mut self,
        subject: &str,
        msg_id: &str,
        payload: Bytes,
        now: Instant,
    ) -> Result<PublishAck, Error> {
        let stream = self
            .streams
            .values_mut()
            .find(|stream| {
                stream
                    .config
                    .subjects
                    .iter()
                    .any(|filter| subject::matches_filter(filter, subject))
            })
            .ok_or_else(|| Error::NoStreamForSubject(subject.to_string()))?;

        let window = stream.config.duplicate_window;
        stream
            .msg_ids
            .retain(|_, (published_at, _)| now.duration_since(*published_at) < window);

        if let Some((_, sequence)) = stream.msg_ids.get(msg_id) {
            return Ok(PublishAck {
                stream: stream.config.name.clone(),
                sequence: *sequence,
                duplicate: true,
            });
        }

        stream.last_sequence += 1;
        let sequence = stream.last_sequence;

        stream.messages.insert(
            sequence,
            StoredMessage {
                subject: subject.to_string(),
                msg_id: (!msg_id.is_empty()).then(|| msg_id.to_string()),
                payload,
            },
        );

        if !msg_id.is_empty() {
            stream.msg_ids.insert(msg_id.to_string(), (now, sequence));
        }

        Ok(PublishAck {
            stream: stream.config.name.clone(),
            sequence,
            duplicate: false,
        })
    }

    /// Hands out up to `batch_size` messages and returns the earliest ack
    /// deadline still outstanding.
    pub fn take(
        &mut self,
        stream_name: &str,
        consumer_name: &str,
        batch_size: usize,
        now: Instant,
    ) -> Result<(Vec<Taken>, Option<Instant>), Error> {
        let stream = self.stream_mut(stream_name)?;
        let StreamState {
            consumers,
            last_sequence,
            messages,
            ..
        } = stream;

        let consumer = consumers
            .get_mut(consumer_name)
            .ok_or_else(|| Error::ConsumerNotFound {
                stream: stream_name.to_string(),
                consumer: consumer_name.to_string(),
            })?;

        consumer.expire(now);

        let mut taken = Vec::new();
        while taken.len() < batch_size && !consumer.saturated() {
            let sequence = if let Some(sequence) = consumer.redeliver.pop_first() {
                sequence
            } else if let Some(sequence) = consumer.next_new(messages, *last_sequence) {
                sequence
            } else {
                break;
            };

            let Some(message) = messages.get(&sequence) else {
                continue;
            };

            consumer.pending.insert(sequence, now + consumer.config.ack_wait);
            let delivered = consumer.deliveries.entry(sequence).or_insert(0);
            *delivered += 1;

            taken.push(Taken {
                sequence,
                delivered: *delivered,
                message: message.clone(),
            });
        }

        Ok((taken, consumer.pending.values().min().copied()))
    }

    /// Acknowledges (or terminates) a message. Unknown sequences are ignored.
    pub fn ack(
        &mut self,
        stream_name: &str,
        consumer_name: &str,
        sequence: u64,
    ) -> Result<(), Error> {
        let consumer = self.consumer_mut(stream_name, consumer_name)?;

        consumer.pending.remove(&sequence);
        consumer.redeliver.remove(&sequence);
        consumer.deliveries.remove(&sequence);

        Ok(())
    }

    /// Queues a pending message for immediate redelivery.
    pub fn nak(
        &mut self,
        stream_name: &str,
        consumer_name: &str,
        sequence: u64,
    ) -> Result<(), Error> {
        let consumer = self.consumer_mut(stream_name, consumer_name)?;

        if consumer.pending.remove(&sequence).is_some() {
            consumer.redeliver.insert(sequence);
        }

        Ok(())
    }

    fn stream(&self, stream_name: &str) -> Result<&StreamState, Error> {
        self.streams
            .get(stream_name)
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))
    }

    fn stream_mut(&mut self, stream_name: &str) -> Result<&mut StreamState, Error> {
        self.streams
            .get_mut(stream_name)
            .ok_or_else(|| Error::StreamNotFound(stream_name.to_string()))
    }

    fn consumer_mut(
        &mut self,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<&mut ConsumerState, Error> {
        self.stream_mut(stream_name)?
            .consumers
            .get_mut(consumer_name)
            .ok_or_else(|| Error::ConsumerNotFound {
                stream: stream_name.to_string(),
                consumer: consumer_name.to_string(),
            })
    }
}

impl StreamState {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            config: self.config.clone(),
            messages: self.messages.len() as u64,
            last_sequence: self.last_sequence,
        }
    }

    fn consumer_info(&self, consumer: &ConsumerState) -> ConsumerInfo {
        let num_pending = self
            .messages
            .range(consumer.next_sequence..)
            .filter(|(_, message)| consumer.wants(&message.subject))
            .count() as u64;

        ConsumerInfo {
            stream_name: self.config.name.clone(),
            name: consumer.config.durable_name.clone(),
            config: consumer.config.clone(),
            num_pending,
            num_ack_pending: consumer.pending.len() as u64,
        }
    }
}

impl ConsumerState {
    fn wants(&self, subject: &str) -> bool {
        self.config
            .filter_subject
            .as_deref()
            .is_none_or(|filter| subject::matches_filter(filter, subject))
    }

    fn saturated(&self) -> bool {
        self.config.max_ack_pending > 0
            && i64::try_from(self.pending.len()).unwrap_or(i64::MAX) >= self.config.max_ack_pending
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(sequence, _)| *sequence)
            .collect();

        for sequence in expired {
            self.pending.remove(&sequence);
            self.redeliver.insert(sequence);
        }
    }

    fn next_new(
        &mut self,
        messages: &BTreeMap<u64, StoredMessage>,
        last_sequence: u64,
    ) -> Option<u64> {
        let found = messages
            .range(self.next_sequence..)
            .find(|(_, message)| self.wants(&message.subject))
            .map(|(sequence, _)| *sequence);

        self.next_sequence = found.map_or(last_sequence + 1, |sequence| sequence + 1);

        found
    }
}
