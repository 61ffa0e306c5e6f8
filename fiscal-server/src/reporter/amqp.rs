//! Error reports over AMQP
//!
//! Reports go to a durable direct exchange, routed by tenant into the
//! durable `{tenant}_errors` queue. The connection reuses whatever broker
//! credentials the consumer is running with, and is re-established after
//! any failure or credential change.

use super::{ErrorReport, ReportSink};
use crate::broker::BrokerError;
use crate::core::{BrokerConfig, Result, ServerError};
use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::watch;

/// Persistent delivery mode
const PERSISTENT: u8 = 2;

pub struct AmqpReportSink {
    broker: watch::Receiver<Option<BrokerConfig>>,
    exchange: String,
    tenant: String,
    link: Option<(BrokerConfig, Connection, Channel)>,
}

impl AmqpReportSink {
    pub fn new(
        broker: watch::Receiver<Option<BrokerConfig>>,
        exchange: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            tenant: tenant.into(),
            link: None,
        }
    }

    pub fn queue_name(&self) -> String {
        format!("{}_errors", self.tenant)
    }

    async fn connect(&self, config: &BrokerConfig) -> std::result::Result<(Connection, Channel), BrokerError> {
        let connection = Connection::connect(&config.uri(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let queue = self.queue_name();
        channel
            .queue_declare(
                &queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &queue,
                &self.exchange,
                &self.tenant,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        tracing::info!(tenant = %self.tenant, queue = %queue, exchange = %self.exchange, "Error publisher connected");
        Ok((connection, channel))
    }

    /// Channel for the current credentials, connecting when needed
    async fn channel(&mut self) -> Result<Channel> {
        let current = self.broker.borrow().clone();
        let Some(config) = current else {
            return Err(ServerError::Config("no broker configured for error reports".into()));
        };

        let stale = match &self.link {
            Some((used, conn, _)) => *used != config || !conn.status().connected(),
            None => true,
        };
        if stale {
            self.close().await;
            let (conn, channel) = self.connect(&config).await?;
            self.link = Some((config, conn, channel));
        }

        match &self.link {
            Some((_, _, channel)) => Ok(channel.clone()),
            None => Err(ServerError::Broker(BrokerError::Closed)),
        }
    }
}

#[async_trait]
impl ReportSink for AmqpReportSink {
    async fn publish(&mut self, report: &ErrorReport) -> Result<()> {
        let payload = serde_json::to_vec(report)
            .map_err(|e| ServerError::Internal(anyhow::Error::new(e)))?;
        let channel = self.channel().await?;

        let published = async {
            channel
                .basic_publish(
                    &self.exchange,
                    &self.tenant,
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default()
                        .with_delivery_mode(PERSISTENT)
                        .with_content_type("application/json".into()),
                )
                .await?
                .await?;
            Ok::<_, lapin::Error>(())
        }
        .await;

        if let Err(e) = published {
            // next report reconnects
            self.close().await;
            return Err(BrokerError::from(e).into());
        }
        tracing::debug!(error_type = %report.error_type, "Error report published");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some((_, conn, _)) = self.link.take()
            && let Err(e) = conn.close(200, "bye").await
        {
            tracing::debug!(error = %e, "Error publisher connection close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_broker_is_an_error() {
        let (_tx, rx) = watch::channel(None);
        let mut sink = AmqpReportSink::new(rx, "fiscalberry_errors", "acme");
        assert_eq!(sink.queue_name(), "acme_errors");
        let reporter = crate::reporter::ErrorReporter::disabled();
        let report = reporter.build(
            crate::reporter::ErrorType::JsonDecode,
            "bad json",
            serde_json::Map::new(),
            None,
        );
        assert!(matches!(sink.publish(&report).await, Err(ServerError::Config(_))));
    }
}
