//! Queue and worker pool behavior

use fiscal_printer::link::{LinkSession, LinkVariant};
use fiscal_printer::transport::{AutoReply, MockTransport};
use fiscal_printer::{Adapter, EpsonAdapter, EpsonModel};
use fiscal_server::core::{BackgroundTasks, QueueConfig};
use fiscal_server::printing::{JobQueue, PrinterRegistry, spawn_pool};
use fiscal_server::reporter::ErrorReporter;
use serde_json::json;
use shared::error::{ErrorCode, ErrorKind};
use shared::models::{Brand, DriverConfig, JobRequest, OperationKind, PrinterConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ticket_job(printer: &str, n: usize) -> JobRequest {
    JobRequest::from_value(json!({
        "printerName": printer,
        "jobId": format!("job-{}", n),
        "printTicket": {
            "encabezado": {"tipo_cbte": "T"},
            "items": [{"ds": format!("Item {}", n), "qty": 1, "importe": 10.0, "alic_iva": 21.0}],
            "pagos": [{"ds": "Efectivo", "importe": 10.0}]
        }
    }))
    .unwrap()
}

fn framed_epson(mock: &MockTransport) -> Adapter {
    let link = LinkSession::new(Box::new(mock.clone()), LinkVariant::Epson);
    Adapter::Epson(EpsonAdapter::new(Box::new(link), EpsonModel::Tm220Af))
}

fn pool(registry: &Arc<PrinterRegistry>, queue: &JobQueue, workers: usize) -> BackgroundTasks {
    let config = QueueConfig {
        workers,
        ..Default::default()
    };
    let mut tasks = BackgroundTasks::new();
    spawn_pool(&mut tasks, queue, registry, &ErrorReporter::disabled(), &config);
    tasks
}

#[tokio::test]
async fn test_full_queue_rejects_immediately() {
    let queue = JobQueue::new(2);
    let _first = queue.submit(ticket_job("P1", 1)).unwrap();
    let _second = queue.submit(ticket_job("P1", 2)).unwrap();

    let started = Instant::now();
    let err = queue.submit(ticket_job("P1", 3)).unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(10));
    assert_eq!(err.code, ErrorCode::QueueFull);
    assert_eq!(err.kind(), ErrorKind::QueueFull);
    assert_eq!(queue.depth(), 2);
}

#[tokio::test]
async fn test_same_printer_commands_never_interleave() {
    let registry = Arc::new(PrinterRegistry::new(vec![PrinterConfig::new(
        "P1",
        Brand::Epson,
        DriverConfig::Dummy,
    )]));
    let mock = MockTransport::auto(AutoReply::new());
    registry.install("P1", framed_epson(&mock)).await.unwrap();

    let queue = JobQueue::new(16);
    let tasks = pool(&registry, &queue, 4);

    let pending: Vec<_> = (0..8)
        .map(|n| queue.submit(ticket_job("P1", n)).unwrap())
        .collect();
    for job in pending {
        let result = job.result().await;
        assert!(result.success, "{:?}", result.error);
    }

    assert!(!mock.overlap_detected());
    let commands = mock.commands();
    assert_eq!(commands.iter().filter(|c| **c == 0x40).count(), 8);
    assert_eq!(commands.iter().filter(|c| **c == 0x45).count(), 8);
    // each ticket opens only after the previous one closed
    let mut open = false;
    for command in commands {
        match command {
            0x40 => {
                assert!(!open);
                open = true;
            }
            0x45 => open = false,
            _ => assert!(open),
        }
    }
    tasks.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_printers_are_independent() {
    let registry = Arc::new(PrinterRegistry::new(vec![
        PrinterConfig::new("P1", Brand::Epson, DriverConfig::Dummy),
        PrinterConfig::new("P2", Brand::Epson, DriverConfig::Dummy),
    ]));
    let silent = MockTransport::new();
    let healthy = MockTransport::auto(AutoReply::new());
    registry.install("P1", framed_epson(&silent)).await.unwrap();
    registry.install("P2", framed_epson(&healthy)).await.unwrap();

    let queue = JobQueue::new(8);
    let tasks = pool(&registry, &queue, 2);

    let stalled = queue.submit(ticket_job("P1", 1)).unwrap();
    let ok = queue.submit(ticket_job("P2", 2)).unwrap();

    // P2 finishes while P1 is still waiting on its silent link
    let result = tokio::time::timeout(Duration::from_secs(5), ok.result())
        .await
        .unwrap();
    assert!(result.success);

    // the silent link eventually times out
    let stalled = stalled.result().await;
    assert_eq!(stalled.error.unwrap().code, ErrorCode::Timeout);
    tasks.shutdown().await;
}

#[tokio::test]
async fn test_caller_wait_limit_does_not_cancel_job() {
    let registry = Arc::new(PrinterRegistry::new(vec![PrinterConfig::new(
        "P1",
        Brand::Epson,
        DriverConfig::Dummy,
    )]));
    let queue = JobQueue::new(4);
    let pending = queue
        .submit(JobRequest::new("P1", OperationKind::GetStatus, json!({})))
        .unwrap();

    // no worker yet: the caller gives up
    let result = pending.wait(Duration::from_millis(20)).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().code, ErrorCode::PrintJobTimeout);
    assert_eq!(queue.depth(), 1);

    let tasks = pool(&registry, &queue, 1);
    for _ in 0..100 {
        if queue.depth() == 0 && queue.running() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(queue.depth(), 0);
    tasks.shutdown().await;
}
