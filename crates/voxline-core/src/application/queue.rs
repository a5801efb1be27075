//! Bounded outbound queue with an explicit overflow policy.
//!
//! Every link owns one queue: the relay pushes without blocking, a single
//! writer task pops and writes to the socket. Live audio uses
//! [`OverflowPolicy::DropOldest`] so a slow recipient hears recent audio
//! instead of an ever-growing backlog; signaling uses
//! [`OverflowPolicy::Reject`] so control messages are never silently lost.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::ports::{LinkError, SendStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the oldest queued entry to make room.
    DropOldest,
    /// Refuse the new entry with [`LinkError::QueueFull`].
    Reject,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer, single-consumer bounded queue.
#[derive(Debug)]
pub struct OutboundQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Notify,
    on_close: Notify,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> OutboundQueue<T> {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Notify::new(),
            on_close: Notify::new(),
            capacity,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn push(&self, item: T) -> Result<SendStatus, LinkError> {
        let status = {
            let mut state = self.lock();
            if state.closed {
                return Err(LinkError::Closed);
            }
            let status = if state.items.len() < self.capacity {
                SendStatus::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.items.pop_front();
                        SendStatus::QueuedDroppedOldest
                    }
                    OverflowPolicy::Reject => {
                        return Err(LinkError::QueueFull {
                            capacity: self.capacity,
                        });
                    }
                }
            };
            state.items.push_back(item);
            status
        };
        self.ready.notify_one();
        Ok(status)
    }

    /// Next entry in FIFO order; `None` once the queue is closed.
    ///
    /// Cancel-safe: an entry is only removed when this returns it.
    pub async fn pop(&self) -> Option<T> {
        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
            }
            self.ready.notified().await;
        }
    }

    /// Close the queue and discard whatever is still queued.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.items.clear();
        }
        self.ready.notify_one();
        self.on_close.notify_waiters();
    }

    /// Resolves once the queue is closed.
    pub async fn closed(&self) {
        loop {
            // Registered before the check, so a concurrent close is not missed.
            let notified = self.on_close.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
