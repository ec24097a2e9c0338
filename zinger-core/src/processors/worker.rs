//! Consumption loop shared by the queue-fed stages.
//!
//! A [`QueueWorker`] takes one delivery at a time from its queue, decodes
//! it, and hands it to a [`Stage`]. The delivery is acknowledged only after
//! the stage has finished all of its side effects. Failures are sorted by
//! [`StageError`]:
//!
//! - `Failed`: retried in process with exponential backoff, up to
//!   `RetryPolicy::max_attempts` attempts, then dead-lettered.
//! - `Rejected` / `TimedOut`: dead-lettered right away.
//! - `Broker`: the worker stops and returns the error. The delivery is left
//!   unacknowledged so the broker hands it out again.
//!
//! A body that does not decode is dead-lettered on the first attempt.

use crate::broker::{BrokerError, Consumer, Delivery, Publisher, publish_json};
use crate::config::RetryPolicy;
use crate::utils::shutdown::wait_for_shutdown;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use zinger_sdk::objects::{DeadLetter, QueueName};

/// How a stage failed to handle a message.
#[derive(Debug, Error)]
pub enum StageError {
    /// A downstream call failed; worth another attempt
    #[error("{0}")]
    Failed(String),

    /// The message can never succeed
    #[error("rejected: {0}")]
    Rejected(String),

    /// A downstream call exceeded its deadline
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The broker failed; the process must stop
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl StageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Failed(_))
    }
}

/// One message-handling step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    type Input: DeserializeOwned + Send + Sync;

    /// Queue this stage consumes.
    fn queue(&self) -> QueueName;

    /// Handle one decoded message, including every side effect that must
    /// happen before it is acknowledged.
    async fn handle(&self, input: &Self::Input) -> Result<(), StageError>;

    /// Called once after the worker stops consuming.
    async fn finish(&self) {}
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    DeadLettered,
    Rejected,
    /// Left unsettled because shutdown interrupted a retry.
    Abandoned,
}

/// Drives a [`Stage`] from a [`Consumer`].
pub struct QueueWorker<S, C> {
    stage: S,
    consumer: C,
    publisher: Arc<dyn Publisher>,
    retry: RetryPolicy,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S, C> QueueWorker<S, C>
where
    S: Stage,
    C: Consumer,
{
    /// Create a worker.
    ///
    /// `publisher` is used for dead letters; stages hold their own handle
    /// for regular output.
    pub fn new(
        stage: S,
        consumer: C,
        publisher: Arc<dyn Publisher>,
        retry: RetryPolicy,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stage,
            consumer,
            publisher,
            retry,
            shutdown_rx,
        }
    }

    /// Consume until shutdown is requested or the broker fails.
    ///
    /// Returns the consumer so the caller can close its channel.
    pub async fn run(mut self) -> Result<C, BrokerError> {
        let queue = self.stage.queue();
        info!(%queue, "Queue worker started");

        let result = self.consume().await;
        self.stage.finish().await;

        match &result {
            Ok(()) => info!(%queue, "Queue worker shutdown complete"),
            Err(e) => error!(%queue, error = %e, "Queue worker stopped on broker failure"),
        }
        result.map(|()| self.consumer)
    }

    async fn consume(&mut self) -> Result<(), BrokerError> {
        let queue = self.stage.queue();
        loop {
            let next = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut self.shutdown_rx) => {
                    info!(%queue, "Queue worker received shutdown signal");
                    return Ok(());
                }

                next = self.consumer.next_delivery() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return Err(e),
                None => return Err(BrokerError::ConsumerClosed(queue.to_string())),
            };

            if self.process(delivery).await? == Disposition::Abandoned {
                return Ok(());
            }
        }
    }

    /// Handle one delivery to completion.
    pub async fn process(&mut self, delivery: Delivery) -> Result<Disposition, BrokerError> {
        let queue = self.stage.queue();
        debug!(%queue, delivery = ?delivery, "Received delivery");

        let input: S::Input = match serde_json::from_slice(&delivery.payload) {
            Ok(input) => input,
            Err(e) => {
                error!(%queue, error = %e, "Malformed message");
                return self
                    .give_up(delivery, format!("malformed message: {e}"), 1)
                    .await;
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.stage.handle(&input).await {
                Ok(()) => {
                    delivery.ack().await?;
                    debug!(%queue, attempt, "Message handled");
                    return Ok(Disposition::Acked);
                }
                Err(StageError::Broker(e)) => return Err(e),
                Err(e) => e,
            };

            if !err.is_retryable() || attempt >= self.retry.max_attempts {
                return self.give_up(delivery, err.to_string(), attempt).await;
            }

            let delay = self.retry.delay_after(attempt);
            warn!(
                %queue,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Stage failed, retrying"
            );

            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut self.shutdown_rx) => {
                    info!(%queue, "Shutdown during retry backoff, leaving message for redelivery");
                    return Ok(Disposition::Abandoned);
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn give_up(
        &self,
        delivery: Delivery,
        reason: String,
        attempts: u32,
    ) -> Result<Disposition, BrokerError> {
        let queue = self.stage.queue();
        if !self.retry.dead_letter {
            error!(%queue, attempts, reason = %reason, "Dropping message");
            delivery.reject().await?;
            return Ok(Disposition::Rejected);
        }

        let letter = DeadLetter::new(queue.as_str(), reason, attempts, &delivery.payload);
        publish_json(self.publisher.as_ref(), queue.dead_letter(), &letter).await?;
        delivery.ack().await?;
        error!(
            %queue,
            attempts,
            reason = %letter.reason,
            dead_letter_queue = queue.dead_letter(),
            "Message dead-lettered"
        );
        Ok(Disposition::DeadLettered)
    }
}
