//! Kafka consumer driver: native partition ordering with contiguous offset
//! commits.
//!
//! Kafka commits an offset for a whole partition, so a flush ack for message
//! N must not commit past an earlier message that is still buffered. The
//! tracker only advances the committed offset over a contiguous prefix of
//! acked deliveries.

use std::collections::{BTreeSet, HashMap};

use crate::consumer::AckPolicy;
use crate::queue::{AckToken, Message};

#[derive(Debug, Default)]
struct PartitionState {
    /// Delivered offsets not yet released by a flush.
    pending: BTreeSet<i64>,
    /// Released offsets above the committed high-water mark.
    acked: BTreeSet<i64>,
    /// Highest offset committed back to the broker.
    committed: Option<i64>,
}

/// Per-partition contiguous-offset commit tracker.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    partitions: HashMap<i32, PartitionState>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a delivery. Offsets below an already-committed mark are
    /// redeliveries and are ignored.
    pub fn record_delivered(&mut self, partition: i32, offset: i64) {
        let state = self.partitions.entry(partition).or_default();
        if state.committed.is_some_and(|committed| offset <= committed) {
            return;
        }
        state.pending.insert(offset);
    }

    /// Releases one offset and returns the new committable offset for the
    /// partition, if the contiguous prefix advanced.
    pub fn record_acked(&mut self, partition: i32, offset: i64) -> Option<i64> {
        let state = self.partitions.entry(partition).or_default();
        if !state.pending.remove(&offset) {
            return None;
        }
        state.acked.insert(offset);

        // The prefix is contiguous when no pending delivery sits below the
        // lowest acked offsets.
        let mut advanced = None;
        loop {
            let Some(&lowest_acked) = state.acked.iter().next() else {
                break;
            };
            if state
                .pending
                .iter()
                .next()
                .is_some_and(|&lowest_pending| lowest_pending < lowest_acked)
            {
                break;
            }
            state.acked.remove(&lowest_acked);
            state.committed = Some(lowest_acked);
            advanced = Some(lowest_acked);
        }

        advanced
    }

    /// Highest committed offset for a partition.
    pub fn committed(&self, partition: i32) -> Option<i64> {
        self.partitions
            .get(&partition)
            .and_then(|state| state.committed)
    }
}

/// Kafka ack policy: forwards a commit only when the contiguous prefix of a
/// partition advances, carrying the highest committable offset.
#[derive(Debug, Default)]
pub struct KafkaAckPolicy {
    tracker: OffsetTracker,
}

impl KafkaAckPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AckPolicy for KafkaAckPolicy {
    fn record_delivered(&mut self, message: &Message) {
        self.tracker.record_delivered(message.partition, message.offset);
    }

    fn record_acked(&mut self, token: AckToken) -> Option<AckToken> {
        let committable = self.tracker.record_acked(token.partition, token.offset)?;
        Some(AckToken {
            offset: committable,
            ..token
        })
    }
}
