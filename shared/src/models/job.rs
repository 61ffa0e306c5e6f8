//! Print Job Model
//!
//! A job payload is a JSON object naming the target printer and carrying
//! exactly one operation key:
//!
//! ```json
//! {"printerName": "P1", "printTicket": {"encabezado": {"tipo_cbte": "T"}, "items": []}}
//! ```

use crate::error::{AppError, AppResult, ErrorCode, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Operation requested by a job payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    PrintTicket,
    PrintFacturaElectronica,
    PrintRemito,
    DailyClose,
    OpenDrawer,
    GetStatus,
    CancelDocument,
    SetHeader,
    SetTrailer,
    GetLastNumber,
}

impl OperationKind {
    pub const ALL: [OperationKind; 10] = [
        OperationKind::PrintTicket,
        OperationKind::PrintFacturaElectronica,
        OperationKind::PrintRemito,
        OperationKind::DailyClose,
        OperationKind::OpenDrawer,
        OperationKind::GetStatus,
        OperationKind::CancelDocument,
        OperationKind::SetHeader,
        OperationKind::SetTrailer,
        OperationKind::GetLastNumber,
    ];

    /// Payload key for this operation
    pub fn key(&self) -> &'static str {
        match self {
            OperationKind::PrintTicket => "printTicket",
            OperationKind::PrintFacturaElectronica => "printFacturaElectronica",
            OperationKind::PrintRemito => "printRemito",
            OperationKind::DailyClose => "dailyClose",
            OperationKind::OpenDrawer => "openDrawer",
            OperationKind::GetStatus => "getStatus",
            OperationKind::CancelDocument => "cancelDocument",
            OperationKind::SetHeader => "setHeader",
            OperationKind::SetTrailer => "setTrailer",
            OperationKind::GetLastNumber => "getLastNumber",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.key() == key)
    }
}

/// Operation arguments: named mapping or positional sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobArgs {
    Named(Map<String, Value>),
    Positional(Vec<Value>),
}

impl JobArgs {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => JobArgs::Named(map),
            Value::Array(items) => JobArgs::Positional(items),
            Value::Null => JobArgs::Positional(Vec::new()),
            scalar => JobArgs::Positional(vec![scalar]),
        }
    }

    /// Argument by name, falling back to position
    pub fn get(&self, name: &str, index: usize) -> Option<&Value> {
        match self {
            JobArgs::Named(map) => map.get(name),
            JobArgs::Positional(items) => items.get(index),
        }
    }

    /// Argument as string, accepting numbers too
    pub fn get_str(&self, name: &str, index: usize) -> Option<String> {
        match self.get(name, index)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn as_named(&self) -> Option<&Map<String, Value>> {
        match self {
            JobArgs::Named(map) => Some(map),
            JobArgs::Positional(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            JobArgs::Named(map) => map.is_empty(),
            JobArgs::Positional(items) => items.is_empty(),
        }
    }
}

/// Decoded job payload
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    /// Producer supplied id, echoed back in the result
    pub job_id: Option<String>,
    pub printer_name: String,
    pub operation: OperationKind,
    pub args: JobArgs,
}

impl JobRequest {
    pub fn new(printer_name: impl Into<String>, operation: OperationKind, args: Value) -> Self {
        Self {
            job_id: None,
            printer_name: printer_name.into(),
            operation,
            args: JobArgs::from_value(args),
        }
    }

    /// Decode raw message bytes
    pub fn from_slice(bytes: &[u8]) -> AppResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| AppError::invalid_format(format!("invalid job payload: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> AppResult<Self> {
        let Value::Object(mut map) = value else {
            return Err(AppError::invalid_request("job payload must be an object"));
        };

        let printer_name = match map.remove("printerName") {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            Some(_) => {
                return Err(AppError::with_message(
                    ErrorCode::RequiredField,
                    "printerName must be a non-empty string",
                ));
            }
            None => {
                return Err(AppError::with_message(
                    ErrorCode::RequiredField,
                    "missing printerName",
                ));
            }
        };

        let job_id = match map.remove("jobId") {
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let mut found = map
            .into_iter()
            .filter_map(|(key, v)| OperationKind::from_key(&key).map(|op| (op, v)));

        let (operation, args) = found.next().ok_or_else(|| {
            AppError::invalid_request("no known operation in job payload")
                .with_detail("printer", printer_name.clone())
        })?;
        if let Some((other, _)) = found.next() {
            return Err(AppError::invalid_request(format!(
                "job payload carries more than one operation ({} and {})",
                operation.key(),
                other.key()
            )));
        }

        Ok(Self {
            job_id,
            printer_name,
            operation,
            args: JobArgs::from_value(args),
        })
    }
}

/// Lifecycle of a job inside the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::TimedOut)
    }
}

/// Structured failure carried by a job result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub error_kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
}

impl From<&AppError> for JobError {
    fn from(err: &AppError) -> Self {
        Self {
            error_kind: err.kind(),
            code: err.code,
            message: err.message.clone(),
        }
    }
}

/// Outcome of one job, delivered exactly once to its caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Seconds spent by the worker
    pub processing_time: f64,
}

impl JobResult {
    pub fn completed(job_id: impl Into<String>, result: Value, processing_time: f64) -> Self {
        Self {
            job_id: job_id.into(),
            success: true,
            result: Some(result),
            error: None,
            processing_time,
        }
    }

    pub fn failed(job_id: impl Into<String>, err: &AppError, processing_time: f64) -> Self {
        Self {
            job_id: job_id.into(),
            success: false,
            result: None,
            error: Some(JobError::from(err)),
            processing_time,
        }
    }

    pub fn state(&self) -> JobState {
        match &self.error {
            None => JobState::Completed,
            Some(e) if e.error_kind == ErrorKind::PrintJobTimeout => JobState::TimedOut,
            Some(_) => JobState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_print_ticket() {
        let payload = json!({
            "printerName": "P1",
            "printTicket": {"encabezado": {"tipo_cbte": "T"}, "items": []}
        });
        let req = JobRequest::from_value(payload).unwrap();
        assert_eq!(req.printer_name, "P1");
        assert_eq!(req.operation, OperationKind::PrintTicket);
        assert!(req.args.as_named().unwrap().contains_key("encabezado"));
        assert!(req.job_id.is_none());
    }

    #[test]
    fn test_parse_positional_and_scalar() {
        let req = JobRequest::from_slice(br#"{"printerName":"P1","dailyClose":"Z","jobId":7}"#)
            .unwrap();
        assert_eq!(req.operation, OperationKind::DailyClose);
        assert_eq!(req.args.get_str("type", 0).as_deref(), Some("Z"));
        assert_eq!(req.job_id.as_deref(), Some("7"));

        let req =
            JobRequest::from_value(json!({"printerName":"P1","openDrawer": null})).unwrap();
        assert!(req.args.is_empty());

        let req =
            JobRequest::from_value(json!({"printerName":"P1","setHeader": ["a", "b"]})).unwrap();
        assert_eq!(req.args.get_str("x", 1).as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_errors() {
        let err = JobRequest::from_slice(b"{not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFormat);

        let err = JobRequest::from_value(json!({"printTicket": {}})).unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredField);

        let err = JobRequest::from_value(json!({"printerName": "P1", "foo": 1})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);

        let err = JobRequest::from_value(json!({
            "printerName": "P1", "getStatus": {}, "openDrawer": {}
        }))
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);

        let err = JobRequest::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::General);
    }

    #[test]
    fn test_job_result_serialize() {
        let ok = JobResult::completed("j1", json!({"documentNumber": "12"}), 0.25);
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["jobId"], "j1");
        assert_eq!(v["success"], true);
        assert_eq!(v["processingTime"], 0.25);
        assert!(v.get("error").is_none());
        assert_eq!(ok.state(), JobState::Completed);

        let err = AppError::with_message(ErrorCode::OutOfPaper, "Printer out of paper");
        let failed = JobResult::failed("j2", &err, 1.0);
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["error"]["errorKind"], "PrinterStatusError");
        assert_eq!(v["error"]["code"], 3005);
        assert_eq!(failed.state(), JobState::Failed);

        let timeout = JobResult::failed("j3", &AppError::job_timeout("j3", 15), 15.0);
        assert_eq!(timeout.state(), JobState::TimedOut);
        assert!(timeout.state().is_terminal());
    }

    #[test]
    fn test_operation_keys_round_trip() {
        for op in OperationKind::ALL {
            assert_eq!(OperationKind::from_key(op.key()), Some(op));
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.key()));
        }
        assert!(OperationKind::from_key("printerName").is_none());
    }
}
