//! Error reporting
//!
//! Failures are classified and handed to a background publisher through a
//! bounded channel. Reporting never waits: when the channel is full the
//! report is dropped and a log line says so.

pub mod amqp;

use crate::core::Result;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use shared::error::AppError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use amqp::AmqpReportSink;

/// Reports kept while the publisher is busy
pub const REPORT_BUFFER: usize = 256;

/// `errorType` of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    JsonDecode,
    Translator,
    CommandExecution,
    StuckPrintJob,
    PrintQueueUsage,
    BrokerConnection,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::JsonDecode => "JSON_DECODE_ERROR",
            ErrorType::Translator => "TRANSLATOR_ERROR",
            ErrorType::CommandExecution => "COMMAND_EXECUTION_ERROR",
            ErrorType::StuckPrintJob => "STUCK_PRINT_JOB",
            ErrorType::PrintQueueUsage => "PRINT_QUEUE_USAGE",
            ErrorType::BrokerConnection => "BROKER_CONNECTION_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub args: Vec<String>,
    pub trace: Vec<String>,
}

impl From<&AppError> for ExceptionInfo {
    fn from(err: &AppError) -> Self {
        let mut trace = Vec::new();
        if let Some(details) = &err.details {
            let mut keys: Vec<_> = details.keys().collect();
            keys.sort();
            trace = keys
                .into_iter()
                .map(|k| format!("{}={}", k, details[k]))
                .collect();
        }
        Self {
            kind: err.kind().name().to_string(),
            args: vec![err.code.code().to_string(), err.message.clone()],
            trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error_type: String,
    pub message: String,
    pub context: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub device_id: String,
    pub tenant: String,
}

/// Cheap to clone; every component holds one
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: Option<mpsc::Sender<ErrorReport>>,
    device_id: String,
    tenant: String,
}

impl ErrorReporter {
    /// Reporter and the receiving end for the publisher task
    pub fn channel(
        capacity: usize,
        device_id: impl Into<String>,
        tenant: impl Into<String>,
    ) -> (Self, mpsc::Receiver<ErrorReport>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let reporter = Self {
            tx: Some(tx),
            device_id: device_id.into(),
            tenant: tenant.into(),
        };
        (reporter, rx)
    }

    /// Reporter that only logs
    pub fn disabled() -> Self {
        Self {
            tx: None,
            device_id: "unknown".into(),
            tenant: String::new(),
        }
    }

    pub fn build(
        &self,
        error_type: ErrorType,
        message: impl Into<String>,
        context: Map<String, Value>,
        exception: Option<ExceptionInfo>,
    ) -> ErrorReport {
        ErrorReport {
            error_type: error_type.as_str().to_string(),
            message: message.into(),
            context,
            exception,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            device_id: self.device_id.clone(),
            tenant: self.tenant.clone(),
        }
    }

    pub fn report(&self, error_type: ErrorType, message: impl Into<String>, context: Map<String, Value>) {
        let report = self.build(error_type, message, context, None);
        self.send(report);
    }

    /// Report `err`, carrying its code and details as the exception part
    pub fn report_error(&self, error_type: ErrorType, err: &AppError, mut context: Map<String, Value>) {
        context
            .entry("errorKind")
            .or_insert_with(|| Value::from(err.kind().name()));
        let report = self.build(error_type, err.message.clone(), context, Some(err.into()));
        self.send(report);
    }

    fn send(&self, report: ErrorReport) {
        let Some(tx) = &self.tx else {
            tracing::debug!(error_type = %report.error_type, message = %report.message, "Error report (publishing disabled)");
            return;
        };
        match tx.try_send(report) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(report)) => {
                tracing::warn!(error_type = %report.error_type, "Error report dropped: publisher backlog full");
            }
            Err(mpsc::error::TrySendError::Closed(report)) => {
                tracing::warn!(error_type = %report.error_type, "Error report dropped: publisher stopped");
            }
        }
    }
}

/// Where reports end up
#[async_trait]
pub trait ReportSink: Send {
    async fn publish(&mut self, report: &ErrorReport) -> Result<()>;

    async fn close(&mut self) {}
}

/// Writes reports to the log; used when no tenant is configured
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn publish(&mut self, report: &ErrorReport) -> Result<()> {
        tracing::error!(
            error_type = %report.error_type,
            device = %report.device_id,
            context = %serde_json::Value::Object(report.context.clone()),
            "{}",
            report.message
        );
        Ok(())
    }
}

/// Drain `rx` into `sink` until shutdown; a failed publish is logged and
/// the report discarded
pub async fn run_publisher(
    mut rx: mpsc::Receiver<ErrorReport>,
    mut sink: Box<dyn ReportSink>,
    shutdown: CancellationToken,
) {
    tracing::info!("Error publisher started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            report = rx.recv() => {
                let Some(report) = report else { break };
                if let Err(e) = sink.publish(&report).await {
                    tracing::warn!(error = %e, error_type = %report.error_type, "Failed to publish error report");
                }
            }
        }
    }
    sink.close().await;
    tracing::info!("Error publisher stopped");
}

/// Context map from `key => value` pairs
#[macro_export]
macro_rules! context {
    () => { ::serde_json::Map::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = ::serde_json::Map::new();
        $( map.insert($key.to_string(), ::serde_json::Value::from($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::ErrorCode;

    #[test]
    fn test_report_shape() {
        let (reporter, mut rx) = ErrorReporter::channel(4, "caja-1", "acme");
        let err = AppError::with_message(ErrorCode::OutOfPaper, "Printer out of paper")
            .with_detail("printer", "P1");
        reporter.report_error(ErrorType::CommandExecution, &err, context!("jobId" => "j1"));

        let report = rx.try_recv().unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errorType"], "COMMAND_EXECUTION_ERROR");
        assert_eq!(json["message"], "Printer out of paper");
        assert_eq!(json["context"]["jobId"], "j1");
        assert_eq!(json["context"]["errorKind"], "PrinterStatusError");
        assert_eq!(json["exception"]["type"], "PrinterStatusError");
        assert_eq!(json["exception"]["args"][0], "3005");
        assert_eq!(json["deviceId"], "caja-1");
        assert_eq!(json["tenant"], "acme");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (reporter, mut rx) = ErrorReporter::channel(1, "d", "t");
        reporter.report(ErrorType::PrintQueueUsage, "first", context!());
        reporter.report(ErrorType::PrintQueueUsage, "second", context!());
        assert_eq!(rx.try_recv().unwrap().message, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        ErrorReporter::disabled().report(ErrorType::JsonDecode, "x", context!("a" => 1));
    }

    #[tokio::test]
    async fn test_publisher_drains_until_shutdown() {
        struct Counting(std::sync::Arc<parking_lot::Mutex<Vec<String>>>);

        #[async_trait]
        impl ReportSink for Counting {
            async fn publish(&mut self, report: &ErrorReport) -> Result<()> {
                self.0.lock().push(report.error_type.clone());
                Ok(())
            }
        }

        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (reporter, rx) = ErrorReporter::channel(8, "d", "t");
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_publisher(rx, Box::new(Counting(seen.clone())), shutdown.clone()));

        reporter.report(ErrorType::StuckPrintJob, "slow", context!());
        reporter.report(ErrorType::BrokerConnection, "down", context!());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(*seen.lock(), vec!["STUCK_PRINT_JOB", "BROKER_CONNECTION_ERROR"]);
    }
}
