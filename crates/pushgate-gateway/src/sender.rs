//! # Sender Worker
//!
//! The daemon loop: pull a job, send it, move on.
//!
//! ## Per-Job State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌─────────┐  token decoded  ┌─────────┐   written   ┌───────────┐     │
//! │  │ FETCHED │ ──────────────► │ SENDING │ ──────────► │ DELIVERED │     │
//! │  └────┬────┘                 └────┬────┘             └───────────┘     │
//! │       │                           │                                     │
//! │       │ bad token                 │ EncodingError / SendError /         │
//! │       │                           │ ConnectionError                     │
//! │       ▼                           ▼                                     │
//! │  ┌─────────────────────────────────────┐                               │
//! │  │ FAILED ──► JobSource::report_failure │ ──► next job                  │
//! │  └─────────────────────────────────────┘                               │
//! │                                                                         │
//! │  One bad job never stops the loop. The loop ends on shutdown or when   │
//! │  the source closes; the in-flight send finishes first and the          │
//! │  connection is closed on the way out.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use pushgate_core::Notification;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::connection::ConnectionManager;
use crate::error::{GatewayError, GatewayResult};
use crate::queue::{JobSource, QueuedJob};
use crate::tls::Connector;

// =============================================================================
// Job State
// =============================================================================

/// Where a single job is in its short life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Fetched,
    Sending,
    Delivered,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Fetched => write!(f, "fetched"),
            JobState::Sending => write!(f, "sending"),
            JobState::Delivered => write!(f, "delivered"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Counts reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub failed: u64,
}

// =============================================================================
// Sender Worker
// =============================================================================

/// Drains a job source into one gateway connection.
pub struct SenderWorker<C: Connector, S: JobSource> {
    manager: ConnectionManager<C>,
    source: S,
    stats: WorkerStats,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running worker.
#[derive(Clone)]
pub struct SenderHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SenderHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> GatewayResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| GatewayError::ChannelError("Shutdown channel closed".into()))
    }
}

impl<C: Connector, S: JobSource> SenderWorker<C, S> {
    /// Creates a new worker and returns a handle.
    pub fn new(manager: ConnectionManager<C>, source: S) -> (Self, SenderHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = SenderWorker {
            manager,
            source,
            stats: WorkerStats::default(),
            shutdown_rx,
        };

        (worker, SenderHandle { shutdown_tx })
    }

    /// Runs until shutdown is requested or the source closes.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) -> WorkerStats {
        info!(endpoint = %self.manager.endpoint(), "Sender worker starting");

        loop {
            let queued = tokio::select! {
                biased;

                // Shutdown wins over a job that is ready at the same time
                Some(()) = self.shutdown_rx.recv() => {
                    info!("Sender worker shutting down");
                    break;
                }

                next = self.source.next_job() => match next {
                    Some(queued) => queued,
                    None => {
                        info!("Job source closed");
                        break;
                    }
                },
            };

            self.process(queued).await;
        }

        self.manager.close().await;
        info!(
            delivered = self.stats.delivered,
            failed = self.stats.failed,
            "Sender worker stopped"
        );
        self.stats
    }

    /// Takes one job through to `Delivered` or `Failed`.
    pub async fn process(&mut self, queued: QueuedJob) -> JobState {
        debug!(job_id = %queued.id, state = %JobState::Fetched, "Job state");

        let result = match Notification::try_from(queued.job.clone()) {
            Ok(notification) => {
                debug!(job_id = %queued.id, state = %JobState::Sending, "Job state");
                self.manager.send(&notification).await
            }
            Err(e) => Err(GatewayError::from(e)),
        };

        match result {
            Ok(()) => {
                self.stats.delivered += 1;
                debug!(job_id = %queued.id, state = %JobState::Delivered, "Job state");
                JobState::Delivered
            }
            Err(e) => {
                self.stats.failed += 1;
                debug!(job_id = %queued.id, state = %JobState::Failed, kind = %e.kind(), "Job state");
                self.source.report_failure(queued, &e).await;
                JobState::Failed
            }
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::connection::{ConnectionConfig, ConnectionState};
    use crate::config::Endpoint;
    use crate::error::ErrorKind;
    use crate::mock::{ConnectStep, MockConnector, StreamScript};
    use crate::queue::MemoryQueue;
    use pushgate_core::{Job, PayloadLimits};

    const TOKEN: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90";

    fn manager(connector: &MockConnector) -> ConnectionManager<MockConnector> {
        let config = ConnectionConfig {
            endpoint: Endpoint::new("127.0.0.1", 2195),
            write_timeout: Duration::from_millis(50),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            limits: PayloadLimits {
                token_len: 16,
                max_payload_len: 256,
            },
        };
        ConnectionManager::new(config, connector.clone())
    }

    #[test]
    fn test_job_state_display() {
        assert_eq!(JobState::Delivered.to_string(), "delivered");
        assert_eq!(JobState::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_delivers_in_dequeue_order() {
        let connector = MockConnector::new();
        let (queue, producer) = MemoryQueue::new(10);
        let (worker, _handle) = SenderWorker::new(manager(&connector), queue);

        for alert in ["one", "two", "three"] {
            producer.push(Job::new(TOKEN).with_alert(alert)).await.unwrap();
        }
        drop(producer);

        let stats = worker.run().await;

        assert_eq!(stats, WorkerStats { delivered: 3, failed: 0 });
        let alerts: Vec<_> = connector
            .frames()
            .iter()
            .map(|f| f.payload_json().unwrap()["aps"]["alert"].clone())
            .collect();
        assert_eq!(alerts, ["one", "two", "three"]);
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_bad_jobs_are_reported_and_skipped() {
        let connector = MockConnector::new();
        let (queue, producer) = MemoryQueue::new(10);
        let failures = producer.failure_log();
        let (worker, _handle) = SenderWorker::new(manager(&connector), queue);

        producer.push(Job::new("not hex")).await.unwrap();
        producer
            .push(Job::new(TOKEN).with_alert("x".repeat(300)))
            .await
            .unwrap();
        producer.push(Job::new(TOKEN).with_alert("fine")).await.unwrap();
        drop(producer);

        let stats = worker.run().await;

        assert_eq!(stats, WorkerStats { delivered: 1, failed: 2 });
        let failures = failures.snapshot().await;
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.kind == ErrorKind::Encoding));
        assert!(failures.iter().all(|f| !f.retryable));
        assert_eq!(connector.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_stop_the_stream() {
        let connector = MockConnector::script([
            ConnectStep::Open(StreamScript::broken()),
            ConnectStep::Open(StreamScript::broken()),
        ]);
        let (queue, producer) = MemoryQueue::new(10);
        let failures = producer.failure_log();
        let (worker, _handle) = SenderWorker::new(manager(&connector), queue);

        producer.push(Job::new(TOKEN).with_alert("lost")).await.unwrap();
        producer.push(Job::new(TOKEN).with_alert("saved")).await.unwrap();
        drop(producer);

        let stats = worker.run().await;

        assert_eq!(stats, WorkerStats { delivered: 1, failed: 1 });
        let failures = failures.snapshot().await;
        assert_eq!(failures[0].kind, ErrorKind::Send);
        assert_eq!(failures[0].job.job.alert.as_deref(), Some("lost"));
        assert_eq!(connector.connects(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_worker_and_closes_connection() {
        let connector = MockConnector::new();
        let (queue, producer) = MemoryQueue::new(10);
        let (worker, handle) = SenderWorker::new(manager(&connector), queue);
        let task = tokio::spawn(worker.run());

        producer.push(Job::new(TOKEN).with_alert("only")).await.unwrap();
        while connector.frames().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        handle.shutdown().await.unwrap();
        let stats = task.await.unwrap();

        assert_eq!(stats.delivered, 1);
        assert_eq!(connector.shutdowns(), 1);
        // Producer still alive: the loop ended on shutdown, not on close
        drop(producer);
    }

    #[tokio::test]
    async fn test_process_reports_state() {
        let connector = MockConnector::new();
        let (queue, _producer) = MemoryQueue::new(10);
        let (mut worker, _handle) = SenderWorker::new(manager(&connector), queue);

        let state = worker.process(QueuedJob::new(Job::new(TOKEN).with_badge(1))).await;
        assert_eq!(state, JobState::Delivered);
        assert_eq!(worker.manager.state(), ConnectionState::Connected);

        let state = worker.process(QueuedJob::new(Job::new("zz"))).await;
        assert_eq!(state, JobState::Failed);
        assert_eq!(worker.stats(), WorkerStats { delivered: 1, failed: 1 });
    }
}
