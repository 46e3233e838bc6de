//! Bounded job queue and worker pool for accepted scans.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use mentions_core::{Platform, ScanTrigger};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::error::ScanRejection;
use crate::scheduler::{ScanJob, ScanRequest, ScanScheduler};

/// Cron platforms waiting for a monitor's in-flight scan to finish.
type Deferred = Arc<Mutex<HashMap<Uuid, Vec<Platform>>>>;

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What happened to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Claimed and queued for a worker.
    Enqueued(Uuid),
    /// A cron request that found the monitor busy; its platforms run as soon
    /// as the monitor's current scan finishes.
    Deferred(Uuid),
}

/// Handle for submitting scan requests. Cheap to clone.
#[derive(Clone)]
pub struct ScanQueue {
    scheduler: Arc<ScanScheduler>,
    tx: mpsc::Sender<ScanJob>,
    deferred: Deferred,
}

impl ScanQueue {
    #[must_use]
    pub fn scheduler(&self) -> &Arc<ScanScheduler> {
        &self.scheduler
    }

    /// Platforms deferred for `monitor_id`, if any.
    #[must_use]
    pub fn deferred_platforms(&self, monitor_id: Uuid) -> Option<Vec<Platform>> {
        lock(&self.deferred).get(&monitor_id).cloned()
    }

    fn defer(&self, monitor_id: Uuid, platforms: &[Platform]) {
        let mut deferred = lock(&self.deferred);
        let pending = deferred.entry(monitor_id).or_default();
        for p in platforms {
            if !pending.contains(p) {
                pending.push(*p);
            }
        }
    }

    /// Like [`ScanQueue::submit`], but a cron request that collides with an
    /// in-flight scan of the same monitor is deferred instead of dropped.
    ///
    /// # Errors
    ///
    /// Same as [`ScanQueue::submit`], except that a deferred cron request is
    /// reported as [`Submission::Deferred`].
    pub async fn submit_or_defer(&self, req: ScanRequest) -> Result<Submission, ScanRejection> {
        match self.submit(req.clone()).await {
            Ok(id) => Ok(Submission::Enqueued(id)),
            Err(ScanRejection::ScanInProgress) if req.trigger == ScanTrigger::Cron => {
                let Some(platforms) = req.platforms.as_deref() else {
                    return Err(ScanRejection::ScanInProgress);
                };
                self.defer(req.monitor_id, platforms);
                tracing::debug!(monitor_id = %req.monitor_id, platforms = platforms.len(), "cron scan deferred");
                Ok(Submission::Deferred(req.monitor_id))
            }
            Err(rejection) => Err(rejection),
        }
    }

    /// Submit whatever was deferred for `monitor_id` while it was scanning.
    async fn run_deferred(&self, monitor_id: Uuid) {
        let pending = lock(&self.deferred).remove(&monitor_id);
        let Some(platforms) = pending else {
            return;
        };
        let req = ScanRequest {
            monitor_id,
            trigger: ScanTrigger::Cron,
            requested_by: None,
            platforms: Some(platforms),
        };
        match self.submit_or_defer(req).await {
            Ok(_) => {}
            Err(rejection) if rejection.is_benign() => {
                tracing::debug!(monitor_id = %monitor_id, reason = rejection.code(), "deferred scan skipped");
            }
            Err(rejection) => {
                tracing::warn!(monitor_id = %monitor_id, error = %rejection, "deferred scan not enqueued");
            }
        }
    }

    /// Admit `req` and enqueue it. On success the monitor is claimed and a
    /// worker will run the scan.
    ///
    /// # Errors
    ///
    /// Returns any admission [`ScanRejection`], or
    /// [`ScanRejection::QueueUnavailable`] when the queue is full or closed.
    /// In the latter case the claim is released again.
    pub async fn submit(&self, req: ScanRequest) -> Result<Uuid, ScanRejection> {
        let job = self.scheduler.request_scan(&req, Utc::now()).await?;
        let monitor_id = job.monitor.id;
        match self.tx.try_send(job) {
            Ok(()) => Ok(monitor_id),
            Err(e) => {
                let job = match e {
                    mpsc::error::TrySendError::Full(job) => {
                        tracing::warn!(monitor_id = %monitor_id, "scan queue full");
                        job
                    }
                    mpsc::error::TrySendError::Closed(job) => {
                        tracing::warn!(monitor_id = %monitor_id, "scan queue closed");
                        job
                    }
                };
                self.scheduler.release(&job).await;
                Err(ScanRejection::QueueUnavailable)
            }
        }
    }
}

/// Runs queued scans with at most `workers` in flight.
pub struct ScanWorkerPool {
    shutdown_tx: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
}

impl ScanWorkerPool {
    /// Start the dispatcher task and return the submission handle.
    #[must_use]
    pub fn spawn(scheduler: Arc<ScanScheduler>, workers: usize, capacity: usize) -> (ScanQueue, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue = ScanQueue {
            scheduler,
            tx,
            deferred: Arc::default(),
        };
        let dispatcher = tokio::spawn(dispatch_loop(
            queue.clone(),
            rx,
            shutdown_rx,
            workers.max(1),
        ));
        tracing::info!(workers, capacity, "scan worker pool started");
        (
            queue,
            Self {
                shutdown_tx,
                dispatcher,
            },
        )
    }

    /// Close the queue, run what is already queued, and wait for every scan
    /// to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.dispatcher.await {
            tracing::error!(error = %e, "scan dispatcher task failed");
        }
        tracing::info!("scan worker pool stopped");
    }
}

async fn dispatch_loop(
    queue: ScanQueue,
    mut rx: mpsc::Receiver<ScanJob>,
    mut shutdown_rx: watch::Receiver<bool>,
    workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut closing = false;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed(), if !closing => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    closing = true;
                    rx.close();
                }
            }
            job = rx.recv() => {
                let Some(job) = job else { break };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    queue.scheduler.release(&job).await;
                    break;
                };
                let queue = queue.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let monitor_id = job.monitor.id;
                    queue.scheduler.execute_scan(job).await;
                    queue.run_deferred(monitor_id).await;
                });
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "scan task failed");
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "scan task failed");
        }
    }
}
