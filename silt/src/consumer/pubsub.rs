//! Pub/Sub consumer driver specifics.
//!
//! Pub/Sub acks every message individually and relies on per-ordering-key
//! delivery (`EnableMessageOrdering` on the subscription) for row-level
//! ordering, so the policy is a straight pass-through of each released token.

use std::time::Duration;

use crate::consumer::AckPolicy;
use crate::queue::{AckToken, Message};

/// Subscription ack deadline requested when the subscription is created.
/// Flushes must complete within this window or the broker redelivers.
pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Naming scheme for per-topic subscriptions.
pub fn subscription_name(topic: &str) -> String {
    format!("silt_{topic}")
}

/// Pub/Sub ack policy: every released token is acked as-is.
#[derive(Debug, Default)]
pub struct PubsubAckPolicy;

impl PubsubAckPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl AckPolicy for PubsubAckPolicy {
    fn record_delivered(&mut self, _message: &Message) {}

    fn record_acked(&mut self, token: AckToken) -> Option<AckToken> {
        Some(token)
    }
}
