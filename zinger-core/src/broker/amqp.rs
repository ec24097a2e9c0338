//! RabbitMQ implementation of the broker seams.

use super::{Acker, BrokerError, Consumer, Delivery, Publisher};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tracing::{debug, info, warn};
use zinger_sdk::objects::QueueName;

/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;

/// A connection to RabbitMQ with a dedicated, confirm-mode publishing channel.
///
/// Consumers get their own channel each (see [`AmqpBroker::consume`]) so a
/// slow consumer never blocks publishing.
pub struct AmqpBroker {
    connection: Connection,
    publish_channel: Channel,
    call_timeout: Duration,
}

impl AmqpBroker {
    /// Connect to the broker at `url` and open the publishing channel.
    ///
    /// `call_timeout` bounds every publish (including its confirmation).
    pub async fn connect(url: &str, call_timeout: Duration) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let publish_channel = connection.create_channel().await?;
        publish_channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        info!("Connected to AMQP broker");

        Ok(Self {
            connection,
            publish_channel,
            call_timeout,
        })
    }

    /// Declare every pipeline queue and its dead-letter queue as durable.
    ///
    /// Declaring is idempotent, so every stage declares the full set at
    /// startup regardless of which queues it touches.
    pub async fn declare_pipeline(&self) -> Result<(), BrokerError> {
        for queue in QueueName::ALL {
            self.declare(queue.as_str()).await?;
            self.declare(queue.dead_letter()).await?;
        }
        Ok(())
    }

    async fn declare(&self, queue: &str) -> Result<(), BrokerError> {
        self.publish_channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        debug!(queue, "Declared durable queue");
        Ok(())
    }

    /// Start consuming `queue` on a fresh channel with a prefetch of one, so
    /// the broker never hands this process a second message before the first
    /// is settled.
    pub async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<AmqpConsumer, BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        let inner = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, consumer_tag, "Consuming queue");

        Ok(AmqpConsumer { channel, inner })
    }

    /// Close the connection. Unacknowledged deliveries return to their queues.
    pub async fn close(&self) {
        if let Err(e) = self.publish_channel.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close publishing channel");
        }
        match self.connection.close(200, "shutdown").await {
            Ok(()) => info!("AMQP connection closed"),
            Err(e) => warn!(error = %e, "Failed to close AMQP connection"),
        }
    }
}

#[async_trait]
impl Publisher for AmqpBroker {
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());

        let publish = async {
            let confirm = self
                .publish_channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    &payload,
                    properties,
                )
                .await?;
            let confirmation = confirm.await?;
            if confirmation.is_nack() {
                return Err(BrokerError::NotConfirmed {
                    queue: queue.to_string(),
                });
            }
            Ok(())
        };

        tokio::time::timeout(self.call_timeout, publish)
            .await
            .map_err(|_| BrokerError::TimedOut(self.call_timeout))?
    }
}

/// Deliveries from one queue on a dedicated channel.
pub struct AmqpConsumer {
    channel: Channel,
    inner: lapin::Consumer,
}

impl AmqpConsumer {
    /// Close the consumer's channel; any unsettled delivery is requeued.
    pub async fn close(&self) {
        if let Err(e) = self.channel.close(200, "shutdown").await {
            warn!(error = %e, "Failed to close consumer channel");
        }
    }
}

#[async_trait]
impl Consumer for AmqpConsumer {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, BrokerError>> {
        let delivery = self.inner.next().await?;
        Some(
            delivery
                .map(|d| Delivery {
                    payload: d.data,
                    redelivered: d.redelivered,
                    acker: Acker::Amqp(d.acker),
                })
                .map_err(BrokerError::from),
        )
    }
}
