use async_nats::jetstream::consumer::pull::Config as NatsPullConfig;
use async_nats::jetstream::consumer::{AckPolicy as NatsAckPolicy, Info as NatsConsumerInfo};
use async_nats::jetstream::stream::{Config as NatsStreamConfig, Info as NatsStreamInfo};
use durable_pubsub::config::{
    AckPolicy, ConsumerConfig, ConsumerInfo, StreamConfig, StreamInfo,
};

pub fn stream_config(config: StreamConfig) -> NatsStreamConfig {
    NatsStreamConfig {
        name: config.name,
        subjects: config.subjects,
        duplicate_window: config.duplicate_window,
        ..Default::default()
    }
}

pub fn stream_info(info: &NatsStreamInfo) -> StreamInfo {
    StreamInfo {
        config: StreamConfig {
            name: info.config.name.clone(),
            subjects: info.config.subjects.clone(),
            duplicate_window: info.config.duplicate_window,
        },
        messages: info.state.messages,
        last_sequence: info.state.last_sequence,
    }
}

pub fn consumer_config(config: ConsumerConfig) -> NatsPullConfig {
    NatsPullConfig {
        durable_name: Some(config.durable_name),
        ack_policy: match config.ack_policy {
            AckPolicy::Explicit => NatsAckPolicy::Explicit,
            AckPolicy::All => NatsAckPolicy::All,
            AckPolicy::None => NatsAckPolicy::None,
        },
        ack_wait: config.ack_wait,
        max_ack_pending: config.max_ack_pending,
        filter_subject: config.filter_subject.unwrap_or_default(),
        ..Default::default()
    }
}

pub fn consumer_info(info: &NatsConsumerInfo) -> ConsumerInfo {
    let config = &info.config;

    ConsumerInfo {
        stream_name: info.stream_name.clone(),
        name: info.name.clone(),
        config: ConsumerConfig {
            durable_name: config
                .durable_name
                .clone()
                .unwrap_or_else(|| info.name.clone()),
            ack_policy: match config.ack_policy {
                NatsAckPolicy::Explicit => AckPolicy::Explicit,
                NatsAckPolicy::All => AckPolicy::All,
                NatsAckPolicy::None => AckPolicy::None,
            },
            ack_wait: config.ack_wait,
            max_ack_pending: config.max_ack_pending,
            filter_subject: (!config.filter_subject.is_empty())
                .then(|| config.filter_subject.clone()),
        },
        num_pending: info.num_pending,
        num_ack_pending: u64::try_from(info.num_ack_pending).unwrap_or(u64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use durable_pubsub::SubscriptionMode;

    #[test]
    fn test_consumer_config_carries_mode_policy() {
        let config = consumer_config(
            ConsumerConfig::durable("C", SubscriptionMode::SingleInstanceMessagesInOrder)
                .with_filter_subject("orders.created"),
        );

        assert_eq!(config.durable_name.as_deref(), Some("C"));
        assert_eq!(config.ack_policy, NatsAckPolicy::Explicit);
        assert_eq!(config.ack_wait, Duration::from_secs(30));
        assert_eq!(config.max_ack_pending, 1);
        assert_eq!(config.filter_subject, "orders.created");
    }

    #[test]
    fn test_unfiltered_consumer_has_empty_filter() {
        let config = consumer_config(ConsumerConfig::durable(
            "C",
            SubscriptionMode::MultipleInstances,
        ));

        assert_eq!(config.max_ack_pending, 0);
        assert!(config.filter_subject.is_empty());
    }

    #[test]
    fn test_stream_config_keeps_duplicate_window() {
        let config = stream_config(
            StreamConfig::new("orders").with_duplicate_window(Duration::from_secs(5)),
        );

        assert_eq!(config.name, "orders");
        assert_eq!(config.subjects, vec!["orders.>".to_string()]);
        assert_eq!(config.duplicate_window, Duration::from_secs(5));
    }
}
