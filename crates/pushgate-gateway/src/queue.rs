//! # Job Queue
//!
//! The boundary between whatever produces notification jobs and the sender
//! worker that consumes them.
//!
//! ```text
//! ┌──────────────────┐   push()/notify()   ┌──────────────────┐  next_job()  ┌──────────────┐
//! │  QueueProducer   │ ──────────────────► │   MemoryQueue    │ ───────────► │ SenderWorker │
//! │  (cloneable)     │   bounded mpsc      │   (JobSource)    │              │              │
//! └────────┬─────────┘                     └────────┬─────────┘              └──────┬───────┘
//!          │                                        │      report_failure()         │
//!          │ failures()                             │ ◄─────────────────────────────┘
//!          └──────────────── FailureLog ◄───────────┘
//! ```
//!
//! Any broker can stand in for [`MemoryQueue`] by implementing [`JobSource`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushgate_core::Job;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::QueueSettings;
use crate::error::{ErrorKind, GatewayError, GatewayResult};

/// Failed jobs a log keeps unless told otherwise.
pub const DEFAULT_FAILURE_LOG_CAPACITY: usize = 1000;

// =============================================================================
// Queued Jobs
// =============================================================================

/// A job as it travels through the queue.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job: Job,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job: Job) -> Self {
        QueuedJob {
            id: Uuid::new_v4(),
            job,
            enqueued_at: Utc::now(),
        }
    }
}

/// A job the worker gave up on.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: QueuedJob,
    pub kind: ErrorKind,
    pub retryable: bool,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

// =============================================================================
// Job Source
// =============================================================================

/// Where the sender worker gets its work.
///
/// `next_job` must be cancel safe: the worker races it against shutdown and
/// drops the pending call when shutdown wins.
#[async_trait]
pub trait JobSource: Send {
    /// Waits for the next job. `None` means the source is closed for good.
    async fn next_job(&mut self) -> Option<QueuedJob>;

    /// Hands a failed job to the source's own failure tracking.
    async fn report_failure(&mut self, job: QueuedJob, error: &GatewayError);
}

// =============================================================================
// Failure Log
// =============================================================================

/// Shared, bounded list of failed jobs.
///
/// Holds at most `capacity` entries; recording past that evicts the oldest.
/// Consumers that want every failure should [`drain`](FailureLog::drain)
/// regularly.
#[derive(Debug, Clone)]
pub struct FailureLog {
    inner: Arc<Mutex<FailureEntries>>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct FailureEntries {
    jobs: VecDeque<FailedJob>,
    evicted: u64,
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FAILURE_LOG_CAPACITY)
    }
}

impl FailureLog {
    pub fn with_capacity(capacity: usize) -> Self {
        FailureLog {
            inner: Arc::new(Mutex::new(FailureEntries::default())),
            capacity: capacity.max(1),
        }
    }

    pub async fn record(&self, job: QueuedJob, error: &GatewayError) {
        let mut entries = self.inner.lock().await;
        if entries.jobs.len() >= self.capacity {
            if let Some(oldest) = entries.jobs.pop_front() {
                entries.evicted += 1;
                warn!(job_id = %oldest.job.id, capacity = self.capacity, "Failure log full, evicting oldest");
            }
        }
        entries.jobs.push_back(FailedJob {
            job,
            kind: error.kind(),
            retryable: error.is_retryable(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
    }

    pub async fn snapshot(&self) -> Vec<FailedJob> {
        self.inner.lock().await.jobs.iter().cloned().collect()
    }

    /// Removes and returns every entry, oldest first.
    pub async fn drain(&self) -> Vec<FailedJob> {
        self.inner.lock().await.jobs.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    /// Entries dropped because the log was full.
    pub async fn evicted(&self) -> u64 {
        self.inner.lock().await.evicted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// =============================================================================
// Memory Queue
// =============================================================================

/// In-process job source over a bounded channel.
pub struct MemoryQueue {
    rx: mpsc::Receiver<QueuedJob>,
    failures: FailureLog,
}

/// Enqueues jobs into a [`MemoryQueue`].
///
/// The queue closes once every producer is dropped.
#[derive(Clone)]
pub struct QueueProducer {
    tx: mpsc::Sender<QueuedJob>,
    failures: FailureLog,
}

impl MemoryQueue {
    /// Creates a queue holding at most `capacity` pending jobs.
    pub fn new(capacity: usize) -> (MemoryQueue, QueueProducer) {
        Self::with_failure_log(capacity, FailureLog::default())
    }

    /// Sizes the queue and its failure log from `[queue]` settings.
    pub fn from_settings(settings: &QueueSettings) -> (MemoryQueue, QueueProducer) {
        Self::with_failure_log(
            settings.capacity,
            FailureLog::with_capacity(settings.failure_log_capacity),
        )
    }

    fn with_failure_log(capacity: usize, failures: FailureLog) -> (MemoryQueue, QueueProducer) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let queue = MemoryQueue {
            rx,
            failures: failures.clone(),
        };
        let producer = QueueProducer { tx, failures };

        (queue, producer)
    }

    pub fn failure_log(&self) -> FailureLog {
        self.failures.clone()
    }
}

#[async_trait]
impl JobSource for MemoryQueue {
    async fn next_job(&mut self) -> Option<QueuedJob> {
        self.rx.recv().await
    }

    async fn report_failure(&mut self, job: QueuedJob, error: &GatewayError) {
        error!(job_id = %job.id, token = %job.job.token, kind = %error.kind(), %error, "Job failed");
        self.failures.record(job, error).await;
    }
}

impl QueueProducer {
    /// Enqueues a job, waiting while the queue is full.
    pub async fn push(&self, job: Job) -> GatewayResult<Uuid> {
        let queued = QueuedJob::new(job);
        let id = queued.id;
        self.tx
            .send(queued)
            .await
            .map_err(|_| GatewayError::ChannelError("Job queue closed".into()))?;
        debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Enqueues `job` addressed to `token`, replacing any token it carried.
    pub async fn notify(&self, token: impl Into<String>, job: Job) -> GatewayResult<Uuid> {
        self.push(Job {
            token: token.into(),
            ..job
        })
        .await
    }

    /// Enqueues from a thread outside the runtime, waiting while the queue
    /// is full.
    ///
    /// Panics if called from within an async context, like
    /// [`mpsc::Sender::blocking_send`].
    pub fn blocking_push(&self, job: Job) -> GatewayResult<Uuid> {
        let queued = QueuedJob::new(job);
        let id = queued.id;
        self.tx
            .blocking_send(queued)
            .map_err(|_| GatewayError::ChannelError("Job queue closed".into()))?;
        debug!(job_id = %id, "Job enqueued");
        Ok(id)
    }

    /// Jobs the worker reported as failed and not yet drained.
    pub async fn failures(&self) -> Vec<FailedJob> {
        self.failures.snapshot().await
    }

    pub fn failure_log(&self) -> FailureLog {
        self.failures.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jobs_come_out_in_order() {
        let (mut queue, producer) = MemoryQueue::new(10);

        let first = producer.push(Job::new("aa").with_alert("one")).await.unwrap();
        let second = producer.push(Job::new("bb").with_alert("two")).await.unwrap();

        assert_eq!(queue.next_job().await.unwrap().id, first);
        assert_eq!(queue.next_job().await.unwrap().id, second);
    }

    #[tokio::test]
    async fn test_queue_closes_when_producers_drop() {
        let (mut queue, producer) = MemoryQueue::new(10);
        let clone = producer.clone();

        producer.push(Job::new("aa")).await.unwrap();
        drop(producer);
        drop(clone);

        assert!(queue.next_job().await.is_some());
        assert!(queue.next_job().await.is_none());
    }

    #[tokio::test]
    async fn test_notify_sets_token() {
        let (mut queue, producer) = MemoryQueue::new(10);

        producer
            .notify("abcd", Job::new("").with_badge(2))
            .await
            .unwrap();

        let queued = queue.next_job().await.unwrap();
        assert_eq!(queued.job.token, "abcd");
        assert_eq!(queued.job.badge, Some(2));
    }

    #[tokio::test]
    async fn test_push_after_queue_dropped_fails() {
        let (queue, producer) = MemoryQueue::new(1);
        drop(queue);

        let err = producer.push(Job::new("aa")).await.unwrap_err();
        assert!(matches!(err, GatewayError::ChannelError(_)));
    }

    #[tokio::test]
    async fn test_reported_failures_visible_to_producer() {
        let (mut queue, producer) = MemoryQueue::new(10);
        producer.push(Job::new("zz")).await.unwrap();

        let job = queue.next_job().await.unwrap();
        let error = GatewayError::SendFailed {
            attempts: 2,
            reason: "broken pipe".into(),
        };
        queue.report_failure(job, &error).await;

        let failures = producer.failures().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, ErrorKind::Send);
        assert!(failures[0].retryable);
        assert_eq!(failures[0].job.job.token, "zz");
    }

    fn send_failed() -> GatewayError {
        GatewayError::SendFailed {
            attempts: 2,
            reason: "broken pipe".into(),
        }
    }

    #[tokio::test]
    async fn test_failure_log_evicts_oldest_when_full() {
        let log = FailureLog::with_capacity(2);

        for token in ["aa", "bb", "cc"] {
            log.record(QueuedJob::new(Job::new(token)), &send_failed()).await;
        }

        let tokens: Vec<String> = log
            .snapshot()
            .await
            .into_iter()
            .map(|failed| failed.job.job.token)
            .collect();
        assert_eq!(tokens, vec!["bb", "cc"]);
        assert_eq!(log.evicted().await, 1);
    }

    #[tokio::test]
    async fn test_failure_log_drain_empties() {
        let log = FailureLog::default();
        log.record(QueuedJob::new(Job::new("aa")), &send_failed()).await;
        log.record(QueuedJob::new(Job::new("bb")), &send_failed()).await;

        let drained = log.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].job.job.token, "aa");
        assert_eq!(log.len().await, 0);
        assert!(log.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_from_settings_sizes_failure_log() {
        let settings = QueueSettings {
            capacity: 4,
            failure_log_capacity: 3,
        };
        let (queue, producer) = MemoryQueue::from_settings(&settings);

        assert_eq!(queue.failure_log().capacity(), 3);
        assert_eq!(producer.failure_log().capacity(), 3);
    }

    #[test]
    fn test_blocking_push_from_plain_thread() {
        let (mut queue, producer) = MemoryQueue::new(4);

        let id = std::thread::spawn(move || producer.blocking_push(Job::new("aa")).unwrap())
            .join()
            .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let queued = runtime.block_on(queue.next_job()).unwrap();
        assert_eq!(queued.id, id);
        // Producer dropped with the thread
        assert!(runtime.block_on(queue.next_job()).is_none());
    }
}
