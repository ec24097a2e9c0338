//! Message broker abstraction.
//!
//! Stages talk to the broker through two seams:
//!
//! - [`Publisher`]: put a JSON body on a named durable queue.
//! - [`Consumer`]: take the next [`Delivery`] from a queue. A delivery must be
//!   settled explicitly with [`Delivery::ack`] or [`Delivery::reject`];
//!   a delivery dropped without settling goes back to the queue and is
//!   redelivered.
//!
//! [`amqp::AmqpBroker`] is the RabbitMQ implementation used by the
//! binaries. [`memory::MemoryBroker`] keeps the same at-least-once semantics
//! in process for tests and local runs.

pub mod amqp;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub use amqp::{AmqpBroker, AmqpConsumer};
pub use memory::{MemoryBroker, MemoryConsumer};

/// Errors that can occur while talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// AMQP protocol or connection error
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The broker negatively acknowledged a publish
    #[error("publish to {queue} was not confirmed by the broker")]
    NotConfirmed { queue: String },

    /// Broker I/O exceeded its deadline
    #[error("broker call timed out after {0:?}")]
    TimedOut(Duration),

    /// The broker cancelled the consumer or closed its channel
    #[error("consumer for {0} was closed by the broker")]
    ConsumerClosed(String),

    /// Payload serialization error
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Publishes message bodies onto named durable queues.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` to `queue` as a persistent message.
    ///
    /// Returns only after the broker has taken responsibility for the
    /// message.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;
}

/// Serialize `message` as JSON and publish it to `queue`.
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn Publisher,
    queue: &str,
    message: &T,
) -> Result<(), BrokerError> {
    let payload = serde_json::to_vec(message)?;
    publisher.publish(queue, payload).await
}

/// A stream of deliveries from one queue.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next delivery.
    ///
    /// Returns `None` once the consumer has been cancelled by the broker.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BrokerError>>;
}

/// A message taken from a queue that has not been settled yet.
pub struct Delivery {
    pub payload: Vec<u8>,
    /// Whether the broker has handed this message out before.
    pub redelivered: bool,
    acker: Acker,
}

enum Acker {
    Amqp(lapin::acker::Acker),
    Memory(memory::MemoryAcker),
}

impl Delivery {
    /// Acknowledge the message; the broker forgets it.
    pub async fn ack(self) -> Result<(), BrokerError> {
        match self.acker {
            Acker::Amqp(acker) => {
                acker
                    .ack(lapin::options::BasicAckOptions::default())
                    .await
                    .map(|_| ())?;
            }
            Acker::Memory(acker) => acker.settle(),
        }
        Ok(())
    }

    /// Negatively acknowledge the message without requeueing it.
    pub async fn reject(self) -> Result<(), BrokerError> {
        match self.acker {
            Acker::Amqp(acker) => {
                acker
                    .nack(lapin::options::BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
                    .map(|_| ())?;
            }
            Acker::Memory(acker) => acker.settle(),
        }
        Ok(())
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}
