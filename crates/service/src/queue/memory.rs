//! In-process work queue.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;

use super::{Delivery, WorkQueue};

#[derive(Debug, Clone)]
struct Message {
    msg_type: String,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Message>,
    unacked: HashMap<u64, Message>,
    next_tag: u64,
    closed: bool,
    acked: u64,
    rejected: u64,
}

/// Queue with broker-like semantics kept in memory.
///
/// Rejected deliveries go back to the front of the queue flagged as
/// redelivered. After [`InMemoryWorkQueue::close`], `receive` returns `None`
/// once nothing is ready or unacknowledged.
#[derive(Debug, Default)]
pub struct InMemoryWorkQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryWorkQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn publish(&self, msg_type: &str, body: impl Into<Vec<u8>>) {
        self.with_state(|state| {
            state.ready.push_back(Message {
                msg_type: msg_type.to_string(),
                body: body.into(),
                redelivered: false,
            })
        });
        self.notify.notify_waiters();
    }

    /// Mark the queue closed. Receivers drain it, then get `None`.
    pub fn close(&self) {
        self.with_state(|state| state.closed = true);
        self.notify.notify_waiters();
    }

    /// Messages waiting for delivery.
    pub fn ready_count(&self) -> usize {
        self.with_state(|state| state.ready.len())
    }

    /// Deliveries not yet settled.
    pub fn unacked_count(&self) -> usize {
        self.with_state(|state| state.unacked.len())
    }

    /// Deliveries settled with `ack`.
    pub fn acked_count(&self) -> u64 {
        self.with_state(|state| state.acked)
    }

    /// Deliveries settled with `reject`.
    pub fn rejected_count(&self) -> u64 {
        self.with_state(|state| state.rejected)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn receive(&self) -> Result<Option<Delivery>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next = self.with_state(|state| {
                if let Some(message) = state.ready.pop_front() {
                    let tag = state.next_tag;
                    state.next_tag += 1;
                    state.unacked.insert(tag, message.clone());
                    return Some(Some(Delivery {
                        tag,
                        msg_type: message.msg_type,
                        body: message.body,
                        redelivered: message.redelivered,
                    }));
                }
                if state.closed && state.unacked.is_empty() {
                    return Some(None);
                }
                None
            });

            if let Some(delivery) = next {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<()> {
        let known = self.with_state(|state| {
            let known = state.unacked.remove(&tag).is_some();
            if known {
                state.acked += 1;
            }
            known
        });
        if !known {
            anyhow::bail!("Unknown delivery tag {}", tag);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn reject(&self, tag: u64) -> Result<()> {
        let known = self.with_state(|state| match state.unacked.remove(&tag) {
            Some(mut message) => {
                message.redelivered = true;
                state.ready.push_front(message);
                state.rejected += 1;
                true
            }
            None => false,
        });
        if !known {
            anyhow::bail!("Unknown delivery tag {}", tag);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
