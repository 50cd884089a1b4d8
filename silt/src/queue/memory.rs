//! In-memory broker double for tests and the `test` output source.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::error::SiltResult;
use crate::queue::{AckToken, Message, Queue};

#[derive(Debug, Default)]
struct Inner {
    messages: VecDeque<Message>,
    acked: Vec<AckToken>,
    closed: bool,
}

/// An in-memory [`Queue`] holding pushed messages and recording acks.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a message for consumption.
    pub async fn push(&self, message: Message) {
        let mut inner = self.inner.lock().await;
        inner.messages.push_back(message);
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Marks the queue closed; `recv` drains the backlog then returns `None`.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Returns a copy of every token acked so far.
    pub async fn acked(&self) -> Vec<AckToken> {
        let inner = self.inner.lock().await;
        inner.acked.clone()
    }
}

impl Queue for MemoryQueue {
    async fn recv(&self) -> SiltResult<Option<Message>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(message) = inner.messages.pop_front() {
                    return Ok(Some(message));
                }
                if inner.closed {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, token: AckToken) -> SiltResult<()> {
        let mut inner = self.inner.lock().await;
        inner.acked.push(token);
        Ok(())
    }
}
