//! Bounded FIFO queues connecting the pipeline stages.
//!
//! One queue type serves both back-pressure policies:
//!
//! * **Lossy** ([`StageQueue::push_lossy`]): live audio. When full, the oldest
//!   item is discarded so the producer never waits on a slow consumer.
//! * **Blocking** ([`StageQueue::push`]): transcripts and speakable units.
//!   The producer waits for space, since dropping text would corrupt the
//!   conversation.
//!
//! Any task may [`drain`](StageQueue::drain) a queue (interruption) or
//! [`close`](StageQueue::close) it (shutdown). Once closed and empty,
//! [`recv`](StageQueue::recv) yields `None`, which every stage treats as its
//! termination signal.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Returned by a blocking push into a closed queue, handing the item back.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct StageQueue<T> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<Inner<T>>,
    item_ready: Notify,
    space_ready: Notify,
}

impl<T> StageQueue<T> {
    /// Create a queue. A zero capacity is treated as one.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            item_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without waiting, discarding the oldest item when full.
    ///
    /// Returns `false` (and drops `item`) if the queue is closed.
    pub fn push_lossy(&self, item: T) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            if inner.items.len() >= self.capacity {
                inner.items.pop_front();
                tracing::debug!(queue = self.name, "Queue full, dropped oldest item");
            }
            inner.items.push_back(item);
        }
        self.item_ready.notify_one();
        true
    }

    /// Enqueue, waiting for space while the queue is full.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
        loop {
            let space = self.space_ready.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(QueueClosed(item));
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.item_ready.notify_one();
                    return Ok(());
                }
            }
            space.await;
        }
    }

    /// Dequeue the next item, waiting while empty.
    ///
    /// Returns `None` once the queue is closed and fully consumed.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let ready = self.item_ready.notified();
            {
                let mut inner = self.lock();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.space_ready.notify_one();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            ready.await;
        }
    }

    /// Dequeue without waiting.
    pub fn try_recv(&self) -> Option<T> {
        let item = self.lock().items.pop_front();
        if item.is_some() {
            self.space_ready.notify_one();
        }
        item
    }

    /// Discard every queued item, returning how many were dropped.
    pub fn drain(&self) -> usize {
        let dropped = {
            let mut inner = self.lock();
            let dropped = inner.items.len();
            inner.items.clear();
            dropped
        };
        if dropped > 0 {
            self.space_ready.notify_waiters();
        }
        dropped
    }

    /// Close the queue and wake every waiter. Queued items stay readable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.item_ready.notify_waiters();
        self.space_ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> std::fmt::Debug for StageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageQueue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
