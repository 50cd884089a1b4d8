//! The broker seam.
//!
//! Broker client libraries are external collaborators: the pipeline consumes
//! opaque [`Message`] values from a [`Queue`] implementation and hands
//! [`AckToken`]s back once the rows they produced have been flushed. The
//! in-memory implementation in [`memory`] backs tests and the `test` output.

pub mod memory;

use std::future::Future;

use crate::error::SiltResult;

/// An opaque broker message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    /// Kafka partition; Pub/Sub subscriptions report 0.
    pub partition: i32,
    /// Kafka offset; Pub/Sub uses a per-connection delivery sequence.
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    /// Pub/Sub acknowledgement id, when the broker uses per-message acks.
    pub ack_id: Option<String>,
}

impl Message {
    /// The acknowledgement handle retained by the buffer until flush succeeds.
    pub fn ack_token(&self) -> AckToken {
        AckToken {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            ack_id: self.ack_id.clone(),
        }
    }
}

/// A deferred acknowledgement for one consumed message.
///
/// Tokens ride inside the table buffer that absorbed the message's rows and
/// come back to the consumer driver only after the destination confirmed the
/// batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AckToken {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub ack_id: Option<String>,
}

/// Broker client contract.
///
/// Implementations wrap a real broker consumer (or the in-memory double) and
/// must be cheaply cloneable; the consumer driver and the ack forwarder hold
/// independent handles.
pub trait Queue: Clone + Send + Sync + 'static {
    /// Receives the next message, waiting if none is available. Returns
    /// `Ok(None)` once the underlying source is closed.
    fn recv(&self) -> impl Future<Output = SiltResult<Option<Message>>> + Send;

    /// Delivers one acknowledgement back to the broker.
    fn ack(&self, token: AckToken) -> impl Future<Output = SiltResult<()>> + Send;
}
