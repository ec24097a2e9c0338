//! In-process broker with at-least-once semantics.
//!
//! Messages published here behave like durable queue entries: a consumer
//! receives one [`Delivery`] at a time, and a delivery dropped without being
//! settled is put back at the head of its queue flagged as redelivered, the
//! same way RabbitMQ requeues the unacknowledged messages of a closed
//! channel.

use super::{Acker, BrokerError, Consumer, Delivery, Publisher};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug)]
struct Pending {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    ready: Mutex<VecDeque<Pending>>,
    notify: Notify,
}

impl MemoryQueue {
    fn push_back(&self, pending: Pending) {
        lock(&self.ready).push_back(pending);
        self.notify.notify_one();
    }

    fn push_front(&self, pending: Pending) {
        lock(&self.ready).push_front(pending);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Pending> {
        lock(&self.ready).pop_front()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A set of named in-memory queues. Cloning shares the queues.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<Mutex<HashMap<String, Arc<MemoryQueue>>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<MemoryQueue> {
        lock(&self.queues)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Start consuming `queue`.
    pub fn consume(&self, queue: &str) -> MemoryConsumer {
        MemoryConsumer {
            queue: self.queue(queue),
        }
    }

    /// Enqueue a message without going through the [`Publisher`] trait.
    pub fn push(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.queue(queue).push_back(Pending {
            payload: payload.into(),
            redelivered: false,
        });
    }

    /// Number of messages waiting in `queue` (excluding unsettled deliveries).
    pub fn len(&self, queue: &str) -> usize {
        lock(&self.queue(queue).ready).len()
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Remove and return every waiting message body in `queue`.
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        lock(&self.queue(queue).ready)
            .drain(..)
            .map(|p| p.payload)
            .collect()
    }

    /// Remove every waiting message in `queue` and decode it as JSON.
    pub fn drain_json<T: DeserializeOwned>(&self, queue: &str) -> Result<Vec<T>, serde_json::Error> {
        self.drain(queue)
            .iter()
            .map(|body| serde_json::from_slice(body))
            .collect()
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.push(queue, payload);
        Ok(())
    }
}

/// Deliveries from one in-memory queue.
#[derive(Debug)]
pub struct MemoryConsumer {
    queue: Arc<MemoryQueue>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BrokerError>> {
        loop {
            let notified = self.queue.notify.notified();
            if let Some(pending) = self.queue.pop() {
                return Some(Ok(Delivery {
                    payload: pending.payload.clone(),
                    redelivered: pending.redelivered,
                    acker: Acker::Memory(MemoryAcker {
                        queue: self.queue.clone(),
                        payload: Some(pending.payload),
                    }),
                }));
            }
            notified.await;
        }
    }
}

/// Settles an in-memory delivery; requeues it when dropped unsettled.
#[derive(Debug)]
pub(super) struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    payload: Option<Vec<u8>>,
}

impl MemoryAcker {
    pub(super) fn settle(mut self) {
        self.payload = None;
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            self.queue.push_front(Pending {
                payload,
                redelivered: true,
            });
        }
    }
}
