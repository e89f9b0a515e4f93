//! # pushgated
//!
//! Shared plumbing for the `pushgated` and `pushgate-feedback` binaries:
//! logging setup, signal handling, the stdin job feeder, the sender run
//! loop, and the feedback output format.

use std::future::Future;
use std::io::{self, BufRead};
use std::thread;

use pushgate_core::{FeedbackItem, Job};
use pushgate_gateway::{
    ConnectionManager, Connector, JobSource, QueueProducer, SenderWorker, WorkerStats,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,pushgate=debug";

/// Initializes tracing to stderr.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show all debug logs
/// - `RUST_LOG=pushgate_gateway=trace` - Trace the gateway crate only
/// - Default: `info,pushgate=debug`
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Completes on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}

// =============================================================================
// Stdin Job Feeder
// =============================================================================

/// Counts from one pass over a line-oriented job stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub enqueued: u64,
    pub skipped: u64,
}

/// Parses one JSON job per line into `producer`.
///
/// Blank lines are ignored and unparsable ones are logged and skipped. Stops
/// at end of input, on a read error, or once the queue is gone. Blocks the
/// calling thread, so never call it from async code.
pub fn feed_jobs<R: BufRead>(reader: R, producer: &QueueProducer) -> FeedStats {
    let mut stats = FeedStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(?e, "Failed to read job stream");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let job = match Job::from_json(line) {
            Ok(job) => job,
            Err(e) => {
                stats.skipped += 1;
                warn!(line = line_no, error = %e, "Skipping unparsable job");
                continue;
            }
        };

        if let Err(e) = producer.blocking_push(job) {
            warn!(line = line_no, error = %e, "Job queue closed, stopping reader");
            break;
        }
        stats.enqueued += 1;
    }

    stats
}

/// Feeds stdin into `producer` from a dedicated OS thread.
///
/// A stdin read cannot be cancelled. Keeping it off the runtime's blocking
/// pool means a pending read never delays runtime shutdown; the process
/// simply exits underneath it. The queue closes when the thread ends.
pub fn spawn_stdin_feeder(producer: QueueProducer) -> io::Result<thread::JoinHandle<FeedStats>> {
    thread::Builder::new()
        .name("pushgated-stdin".into())
        .spawn(move || {
            let stats = feed_jobs(io::stdin().lock(), &producer);
            info!(enqueued = stats.enqueued, skipped = stats.skipped, "Stdin closed");
            stats
        })
}

// =============================================================================
// Sender Run Loop
// =============================================================================

/// Runs a sender worker until `shutdown` completes or `source` closes.
pub async fn run_sender<C, S, F>(manager: ConnectionManager<C>, source: S, shutdown: F) -> WorkerStats
where
    C: Connector,
    S: JobSource,
    F: Future<Output = ()> + Send + 'static,
{
    let (worker, handle) = SenderWorker::new(manager, source);

    let stopper = tokio::spawn(async move {
        shutdown.await;
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Sender worker already stopped");
        }
    });

    let stats = worker.run().await;
    stopper.abort();
    stats
}

/// One feedback item as a JSON line: `{"timestamp": RFC3339, "token": hex}`.
pub fn feedback_line(item: &FeedbackItem) -> serde_json::Result<String> {
    serde_json::to_string(item)
}
