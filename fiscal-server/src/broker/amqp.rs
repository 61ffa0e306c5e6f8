//! AMQP consumer sessions (lapin)

use super::{Acknowledger, BrokerConnector, BrokerError, BrokerResult, ConsumerSession, Delivery};
use crate::core::BrokerConfig;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::{debug, info, instrument};

#[derive(Debug, Default, Clone)]
pub struct AmqpConnector;

impl AmqpConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Declare `exchange` unless it already exists
///
/// A failed passive declare closes its channel, so it gets its own.
async fn ensure_exchange(conn: &Connection, exchange: &str) -> BrokerResult<()> {
    let probe = conn.create_channel().await?;
    let passive = probe
        .exchange_declare(
            exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                passive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await;
    if passive.is_ok() {
        let _ = probe.close(200, "ok").await;
        return Ok(());
    }

    debug!(exchange, "Exchange missing, creating it");
    let channel = conn.create_channel().await?;
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    let _ = channel.close(200, "ok").await;
    Ok(())
}

async fn ensure_queue(conn: &Connection, queue: &str) -> BrokerResult<()> {
    let probe = conn.create_channel().await?;
    let passive = probe
        .queue_declare(
            queue,
            QueueDeclareOptions {
                passive: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await;
    if passive.is_ok() {
        let _ = probe.close(200, "ok").await;
        return Ok(());
    }

    debug!(queue, "Queue missing, creating it");
    let channel = conn.create_channel().await?;
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    let _ = channel.close(200, "ok").await;
    Ok(())
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    #[instrument(skip_all, fields(host = %config.host, queue = %config.queue))]
    async fn connect(&self, config: &BrokerConfig) -> BrokerResult<Box<dyn ConsumerSession>> {
        if config.queue.trim().is_empty() {
            return Err(BrokerError::Connection("no queue name configured".into()));
        }

        let conn = Connection::connect(&config.uri(), ConnectionProperties::default()).await?;
        ensure_exchange(&conn, &config.exchange).await?;
        ensure_queue(&conn, &config.queue).await?;

        let channel = conn.create_channel().await?;
        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                &config.queue,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(exchange = %config.exchange, "Queue bound");

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                &config.queue,
                &format!("fiscal-server-{}", config.queue),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(prefetch = config.prefetch, "Consuming");

        Ok(Box::new(AmqpSession {
            conn,
            channel,
            consumer,
        }))
    }
}

struct AmqpSession {
    conn: Connection,
    channel: Channel,
    consumer: Consumer,
}

#[async_trait]
impl ConsumerSession for AmqpSession {
    async fn next_delivery(&mut self) -> Option<BrokerResult<Delivery>> {
        let next = self.consumer.next().await?;
        Some(match next {
            Ok(delivery) => Ok(Delivery::new(
                delivery.data,
                Box::new(AmqpAcker(delivery.acker)),
            )),
            Err(e) => Err(e.into()),
        })
    }

    async fn close(&mut self) {
        if let Err(e) = self.channel.close(200, "bye").await {
            debug!(error = %e, "Channel close failed");
        }
        if let Err(e) = self.conn.close(200, "bye").await {
            debug!(error = %e, "Connection close failed");
        }
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> BrokerResult<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Delivery(e.to_string()))?;
        Ok(())
    }

    async fn reject(&self) -> BrokerResult<()> {
        self.0
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map_err(|e| BrokerError::Delivery(e.to_string()))?;
        Ok(())
    }
}
