//! Broker connection supervisor
//!
//! Owns the connect / consume / back off loop. A configuration change
//! stops the running consumer and waits for it to finish, in-flight
//! deliveries included, before the session is closed and the next
//! connection is opened. At most one consumer exists at a time.

use super::{BackoffPolicy, BrokerConnector, BrokerConsumer, BrokerHandle, BrokerState};
use crate::context;
use crate::core::BrokerConfig;
use crate::reporter::{ErrorReporter, ErrorType};
use shared::error::AppError;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why a session ended
enum SessionEnd {
    Shutdown,
    Reconfigured,
    Failed(super::BrokerError),
}

pub struct BrokerSupervisor {
    connector: Arc<dyn BrokerConnector>,
    consumer: BrokerConsumer,
    policy: BackoffPolicy,
    reporter: ErrorReporter,
    config_rx: watch::Receiver<Option<BrokerConfig>>,
    state_tx: watch::Sender<BrokerState>,
}

impl BrokerSupervisor {
    /// Supervisor plus the handle used to reconfigure and observe it
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        consumer: BrokerConsumer,
        policy: BackoffPolicy,
        reporter: ErrorReporter,
        initial: Option<BrokerConfig>,
    ) -> (Self, BrokerHandle) {
        let initial_state = if initial.is_some() {
            BrokerState::Disconnected
        } else {
            BrokerState::Disabled
        };
        let (config_tx, config_rx) = watch::channel(initial);
        let (state_tx, state_rx) = watch::channel(initial_state);
        let supervisor = Self {
            connector,
            consumer,
            policy,
            reporter,
            config_rx,
            state_tx,
        };
        (supervisor, BrokerHandle::new(config_tx, state_rx))
    }

    fn set_state(&self, state: BrokerState) {
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut attempt: u32 = 0;

        loop {
            let current = self.config_rx.borrow_and_update().clone();
            let config = match current {
                Some(config) => config,
                None => {
                    self.set_state(BrokerState::Disabled);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        changed = self.config_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                    attempt = 0;
                    continue;
                }
            };

            match self.session(&config, &shutdown, &mut attempt).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Reconfigured => {
                    info!("Broker configuration changed, reconnecting");
                    attempt = 0;
                    continue;
                }
                SessionEnd::Failed(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.policy.delay(attempt);
                    warn!(attempt, delay_secs = delay.as_secs(), error = %e, "Broker connection lost, backing off");
                    self.reporter.report_error(
                        ErrorType::BrokerConnection,
                        &AppError::from(e),
                        context!(
                            "host" => config.host.as_str(),
                            "queue" => config.queue.as_str(),
                            "attempt" => attempt,
                            "retryInSecs" => delay.as_secs(),
                        ),
                    );
                    self.set_state(BrokerState::Backoff);

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        changed = self.config_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            attempt = 0;
                        }
                        waited = self.policy.wait(attempt, &shutdown) => {
                            if !waited {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.set_state(BrokerState::Stopped);
        info!("Broker supervisor stopped");
    }

    /// One connection: connect, consume until it fails, the config changes
    /// or shutdown
    async fn session(
        &mut self,
        config: &BrokerConfig,
        shutdown: &CancellationToken,
        attempt: &mut u32,
    ) -> SessionEnd {
        self.set_state(BrokerState::Connecting);
        info!(host = %config.host, port = config.port, queue = %config.queue, "Connecting to broker");

        let connect = self.connector.connect(config);
        let mut session = tokio::select! {
            _ = shutdown.cancelled() => return SessionEnd::Shutdown,
            changed = self.config_rx.changed() => {
                return match changed {
                    Ok(()) => SessionEnd::Reconfigured,
                    Err(_) => SessionEnd::Shutdown,
                };
            }
            session = connect => match session {
                Ok(session) => session,
                Err(e) => return SessionEnd::Failed(e),
            },
        };
        self.set_state(BrokerState::Bound);

        let stop = shutdown.child_token();
        self.set_state(BrokerState::Consuming);
        *attempt = 0;
        info!(queue = %config.queue, "Broker consumer running");

        let end = {
            let consume = self.consumer.consume(session.as_mut(), &stop, shutdown);
            tokio::pin!(consume);
            tokio::select! {
                result = &mut consume => match result {
                    Ok(()) => SessionEnd::Shutdown,
                    Err(e) => SessionEnd::Failed(e),
                },
                changed = self.config_rx.changed() => {
                    stop.cancel();
                    // in-flight deliveries settle before the session closes
                    if let Err(e) = consume.await {
                        warn!(error = %e, "Broker consumer failed while stopping");
                    }
                    match changed {
                        Ok(()) => SessionEnd::Reconfigured,
                        Err(_) => SessionEnd::Shutdown,
                    }
                }
            }
        };

        session.close().await;
        self.set_state(BrokerState::Disconnected);
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, BrokerResult, ConsumerSession, Delivery};
    use crate::printing::JobQueue;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails every connect and records the call times
    #[derive(Default)]
    struct Refusing(Mutex<Vec<tokio::time::Instant>>);

    #[async_trait]
    impl BrokerConnector for Refusing {
        async fn connect(&self, _config: &BrokerConfig) -> BrokerResult<Box<dyn ConsumerSession>> {
            self.0.lock().unwrap().push(tokio::time::Instant::now());
            Err(BrokerError::Connection("refused".into()))
        }
    }

    struct Idle;

    #[async_trait]
    impl ConsumerSession for Idle {
        async fn next_delivery(&mut self) -> Option<BrokerResult<Delivery>> {
            std::future::pending().await
        }

        async fn close(&mut self) {}
    }

    /// Records which hosts were connected to
    #[derive(Default)]
    struct Accepting(Mutex<Vec<String>>);

    #[async_trait]
    impl BrokerConnector for Accepting {
        async fn connect(&self, config: &BrokerConfig) -> BrokerResult<Box<dyn ConsumerSession>> {
            self.0.lock().unwrap().push(config.host.clone());
            Ok(Box::new(Idle))
        }
    }

    fn consumer() -> BrokerConsumer {
        BrokerConsumer::new(JobQueue::new(4), ErrorReporter::disabled())
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_attempts() {
        let connector = Arc::new(Refusing::default());
        let (reporter, mut reports) = ErrorReporter::channel(16, "dev", "acme");
        let (supervisor, handle) = BrokerSupervisor::new(
            connector.clone(),
            consumer(),
            BackoffPolicy::default(),
            reporter,
            Some(BrokerConfig::new("rabbit", "dev")),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(5 + 5 + 5 + 10 + 20 + 1)).await;
        let calls = connector.0.lock().unwrap().clone();
        let gaps: Vec<u64> = calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![5, 5, 5, 10, 20]);
        assert_eq!(handle.state(), BrokerState::Backoff);
        assert_eq!(reports.recv().await.unwrap().error_type, "BROKER_CONNECTION_ERROR");

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(handle.state(), BrokerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_replaces_consumer() {
        let connector = Arc::new(Accepting::default());
        let (supervisor, handle) = BrokerSupervisor::new(
            connector.clone(),
            consumer(),
            BackoffPolicy::default(),
            ErrorReporter::disabled(),
            None,
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), BrokerState::Disabled);

        handle.reconfigure(BrokerConfig::new("first", "dev"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(handle.state(), BrokerState::Consuming);

        handle.reconfigure(BrokerConfig::new("second", "dev"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*connector.0.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(handle.state(), BrokerState::Consuming);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[derive(Clone, Default)]
    struct Events(Arc<Mutex<Vec<String>>>);

    impl Events {
        fn push(&self, event: impl Into<String>) {
            self.0.lock().unwrap().push(event.into());
        }

        fn seen(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct EventAcker(Events);

    #[async_trait]
    impl crate::broker::Acknowledger for EventAcker {
        async fn ack(&self) -> BrokerResult<()> {
            self.0.push("ack");
            Ok(())
        }

        async fn reject(&self) -> BrokerResult<()> {
            self.0.push("reject");
            Ok(())
        }
    }

    /// Hands out one drawer job, then stays quiet
    struct OneDelivery {
        events: Events,
        sent: bool,
    }

    #[async_trait]
    impl ConsumerSession for OneDelivery {
        async fn next_delivery(&mut self) -> Option<BrokerResult<Delivery>> {
            if !self.sent {
                self.sent = true;
                let body = br#"{"printerName":"P1","openDrawer":{}}"#.to_vec();
                return Some(Ok(Delivery::new(body, Box::new(EventAcker(self.events.clone())))));
            }
            std::future::pending().await
        }

        async fn close(&mut self) {
            self.events.push("close");
        }
    }

    struct Recording(Events);

    #[async_trait]
    impl BrokerConnector for Recording {
        async fn connect(&self, config: &BrokerConfig) -> BrokerResult<Box<dyn ConsumerSession>> {
            self.0.push(format!("connect {}", config.host));
            Ok(Box::new(OneDelivery {
                events: self.0.clone(),
                sent: false,
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_settles_in_flight_delivery_before_close() {
        let events = Events::default();
        let queue = JobQueue::new(4);
        let (supervisor, handle) = BrokerSupervisor::new(
            Arc::new(Recording(events.clone())),
            BrokerConsumer::new(queue.clone(), ErrorReporter::disabled()),
            BackoffPolicy::default(),
            ErrorReporter::disabled(),
            Some(BrokerConfig::new("first", "dev")),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(shutdown.clone()));

        // act as the worker and hold the job
        let rx = queue.receiver();
        let job = rx.lock().await.recv().await.unwrap();

        handle.reconfigure(BrokerConfig::new("second", "dev"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(events.seen(), vec!["connect first"]);

        let id = job.job_id.clone();
        job.complete(shared::models::JobResult::completed(id, serde_json::json!({}), 0.0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = events.seen();
        assert_eq!(seen[..4], ["connect first", "ack", "close", "connect second"]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff() {
        let connector = Arc::new(Refusing::default());
        let (supervisor, handle) = BrokerSupervisor::new(
            connector.clone(),
            consumer(),
            BackoffPolicy::default(),
            ErrorReporter::disabled(),
            Some(BrokerConfig::new("rabbit", "dev")),
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), BrokerState::Backoff);
        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(handle.state(), BrokerState::Stopped);
        assert_eq!(connector.0.lock().unwrap().len(), 1);
    }
}
