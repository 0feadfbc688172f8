use std::fmt::{Display, Formatter, Result as FmtResult};

/// Defines how a consumer and its subscribers are configured.
///
/// Use [`SubscriptionMode::SingleInstanceMessagesInOrder`] when messages must be
/// processed strictly in order. Use [`SubscriptionMode::MultipleInstances`] when
/// order does not matter but horizontal scaling does.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SubscriptionMode {
    /// Enables multiple subscribers of one consumer for horizontal scaling.
    ///
    /// Message order cannot be guaranteed once a message is redelivered after a
    /// handler failure.
    #[default]
    MultipleInstances,

    /// Enables strict message order.
    ///
    /// A message whose handler fails is retried until it succeeds, and no later
    /// message is delivered meanwhile. This blocks the whole consumer, so
    /// horizontal scaling is not effectively possible.
    SingleInstanceMessagesInOrder,
}

impl SubscriptionMode {
    /// The number of unacknowledged messages a consumer in this mode may have
    /// in flight. Zero means unbounded.
    #[must_use]
    pub const fn max_ack_pending(self) -> i64 {
        match self {
            Self::MultipleInstances => 0,
            Self::SingleInstanceMessagesInOrder => 1,
        }
    }

    /// Recovers the mode implied by a stored consumer's `max_ack_pending`.
    ///
    /// Only a limit of exactly one implies strict ordering. Zero, negative
    /// values, and any server-assigned default all describe a consumer that
    /// admits several messages in flight.
    #[must_use]
    pub const fn from_max_ack_pending(max_ack_pending: i64) -> Self {
        match max_ack_pending {
            1 => Self::SingleInstanceMessagesInOrder,
            _ => Self::MultipleInstances,
        }
    }

    /// The variant name, as used in drift errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MultipleInstances => "MultipleInstances",
            Self::SingleInstanceMessagesInOrder => "SingleInstanceMessagesInOrder",
        }
    }
}

/// Raw mode values: `0` and `1` name the two variants. Unknown values degrade to
/// [`SubscriptionMode::MultipleInstances`] instead of failing.
///
/// Raw values share their encoding with the stored limit, so this is the same
/// mapping as [`SubscriptionMode::from_max_ack_pending`].
impl From<i64> for SubscriptionMode {
    fn from(raw: i64) -> Self {
        Self::from_max_ack_pending(raw)
    }
}

impl Display for SubscriptionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_ack_pending_policy() {
        assert_eq!(SubscriptionMode::MultipleInstances.max_ack_pending(), 0);
        assert_eq!(
            SubscriptionMode::SingleInstanceMessagesInOrder.max_ack_pending(),
            1
        );
    }

    #[test]
    fn test_default_is_multiple_instances() {
        assert_eq!(
            SubscriptionMode::default(),
            SubscriptionMode::MultipleInstances
        );
    }

    #[test]
    fn test_unknown_raw_mode_falls_back_to_unbounded() {
        for raw in [-1, 2, 7, i64::MAX] {
            let mode = SubscriptionMode::from(raw);
            assert_eq!(mode, SubscriptionMode::MultipleInstances);
            assert_eq!(mode.max_ack_pending(), 0);
        }

        assert_eq!(
            SubscriptionMode::from(1),
            SubscriptionMode::SingleInstanceMessagesInOrder
        );
    }

    #[test]
    fn test_inverse_mapping_round_trips_policy() {
        for mode in [
            SubscriptionMode::MultipleInstances,
            SubscriptionMode::SingleInstanceMessagesInOrder,
        ] {
            assert_eq!(
                SubscriptionMode::from_max_ack_pending(mode.max_ack_pending()),
                mode
            );
        }
    }

    #[test]
    fn test_server_default_limit_is_multiple_instances() {
        // JetStream stores 1000 when a consumer is created without a limit.
        assert_eq!(
            SubscriptionMode::from_max_ack_pending(1000),
            SubscriptionMode::MultipleInstances
        );
        assert_eq!(
            SubscriptionMode::from_max_ack_pending(-1),
            SubscriptionMode::MultipleInstances
        );
    }

    #[test]
    fn test_raw_mode_and_stored_limit_agree() {
        for raw in [i64::MIN, -1, 0, 1, 2, 1000] {
            assert_eq!(
                SubscriptionMode::from(raw),
                SubscriptionMode::from_max_ack_pending(raw)
            );
        }
    }

    #[test]
    fn test_display_uses_variant_name() {
        assert_eq!(
            SubscriptionMode::SingleInstanceMessagesInOrder.to_string(),
            "SingleInstanceMessagesInOrder"
        );
    }
}
