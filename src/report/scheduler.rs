//! Periodic report task.
//!
//! A scheduled `ReportJob` moves into its own task and comes back out on
//! `cancel`, carrying its updated header flag and next deadline. Deadlines
//! advance by exactly one interval per fire, so a slow write never shifts
//! the schedule. Writes run on the blocking pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{self, JoinHandle};
use tokio::time::Instant;

use super::{write_report, ReportJob};
use crate::error::ReportError;
use crate::notifier::EventNotifier;
use crate::store::PacketStore;

struct RunningJob {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<ReportJob>,
}

pub struct ReportScheduler {
    store: Arc<PacketStore>,
    notifier: Arc<dyn EventNotifier>,
    running: Option<RunningJob>,
}

impl ReportScheduler {
    pub fn new(store: Arc<PacketStore>, notifier: Arc<dyn EventNotifier>) -> Self {
        Self {
            store,
            notifier,
            running: None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.running.is_some()
    }

    /// Start firing `job`, first after `first_delay` and then every
    /// `job.interval`. A job already running is aborted.
    pub fn schedule(&mut self, mut job: ReportJob, first_delay: Duration) {
        if let Some(previous) = self.running.take() {
            previous.handle.abort();
        }

        job.next_fire_deadline = Some(Instant::now() + first_delay);
        tracing::debug!(
            "Report to {} scheduled in {:?}, then every {:?}",
            job.destination.display(),
            first_delay,
            job.interval
        );

        let (cancel, cancelled) = oneshot::channel();
        let handle = tokio::spawn(run_job(
            job,
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            cancelled,
        ));
        self.running = Some(RunningJob { cancel, handle });
    }

    /// Stop the timer and hand the job back with its remaining state.
    pub async fn cancel(&mut self) -> Option<ReportJob> {
        let running = self.running.take()?;
        let _ = running.cancel.send(());
        match running.handle.await {
            Ok(job) => Some(job),
            Err(e) => {
                tracing::warn!("Report task ended abnormally: {}", e);
                None
            }
        }
    }
}

impl Drop for ReportScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

async fn run_job(
    mut job: ReportJob,
    store: Arc<PacketStore>,
    notifier: Arc<dyn EventNotifier>,
    mut cancelled: oneshot::Receiver<()>,
) -> ReportJob {
    loop {
        let deadline = job.next_fire_deadline.unwrap_or_else(Instant::now);
        tokio::select! {
            // A deadline that is already due wins over a concurrent cancel
            biased;
            _ = tokio::time::sleep_until(deadline) => {
                fire(&mut job, &store, notifier.as_ref()).await;
                job.next_fire_deadline = Some(deadline + job.interval);
            }
            _ = &mut cancelled => return job,
        }
    }
}

async fn fire(job: &mut ReportJob, store: &Arc<PacketStore>, notifier: &dyn EventNotifier) {
    let written = write_snapshot(
        Arc::clone(store),
        job.destination.clone(),
        job.is_first_write,
    )
    .await;

    match written {
        Ok(rows) => {
            job.is_first_write = false;
            notifier.report_written(&job.destination, rows);
        }
        Err(e) => notifier.report_failed(&job.destination, &e),
    }
}

/// Snapshot the store and write it on the blocking pool; the store keeps
/// growing and the write is synchronous file I/O.
async fn write_snapshot(
    store: Arc<PacketStore>,
    destination: PathBuf,
    is_first: bool,
) -> Result<usize, ReportError> {
    let path = destination.clone();
    task::spawn_blocking(move || {
        let packets = store.snapshot();
        write_report(&packets, &destination, is_first)
    })
    .await
    .unwrap_or_else(|e| {
        Err(ReportError::Io {
            path,
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })
    })
}
