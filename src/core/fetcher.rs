use crate::core::error::FetchError;
use crate::core::events::{ArchiveEvent, ProgressSnapshot};
use crate::core::model::{RequestHeaders, SegmentIndex, SegmentStatus};
use crate::core::retry::{run_with_retry, RetryOutcome, RetryPolicy};
use crate::core::tracker::{Claim, SharedTracker};
use crate::plugins::registry::HttpFetch;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    /// Already complete on disk; no request made.
    Skipped,
    Failed { reason: String },
    /// Submitted index that was unknown or held elsewhere.
    Unclaimed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub index: SegmentIndex,
    pub attempts: u32,
    pub outcome: FetchOutcome,
}

pub struct ConcurrentSegmentFetcher {
    fetch: Arc<dyn HttpFetch>,
    headers: RequestHeaders,
    policy: RetryPolicy,
    width: usize,
    cancel: CancellationToken,
    events: broadcast::Sender<ArchiveEvent>,
}

impl ConcurrentSegmentFetcher {
    pub fn new(
        fetch: Arc<dyn HttpFetch>,
        headers: RequestHeaders,
        policy: RetryPolicy,
        width: usize,
        cancel: CancellationToken,
        events: broadcast::Sender<ArchiveEvent>,
    ) -> Self {
        Self { fetch, headers, policy, width: width.max(1), cancel, events }
    }

    /// Starts `width` workers over `tracker`. Work arrives later through [`FetchPool::submit`].
    pub fn spawn(self, tracker: SharedTracker) -> FetchPool {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = watch::channel(ProgressSnapshot::default());
        let submitted = Arc::new(AtomicU64::new(0));

        let worker = Arc::new(SegmentWorker {
            fetch: self.fetch,
            headers: self.headers,
            policy: self.policy,
            cancel: self.cancel.clone(),
            tracker,
        });

        let workers = (0..self.width)
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&worker), Arc::clone(&queue_rx), done_tx.clone())))
            .collect();
        drop(done_tx);

        let collector = tokio::spawn(collect(done_rx, Arc::clone(&submitted), self.events, progress_tx));

        FetchPool { queue: queue_tx, submitted, progress: progress_rx, workers, collector, cancel: self.cancel }
    }
}

/// Handle to a running worker pool.
pub struct FetchPool {
    queue: mpsc::UnboundedSender<SegmentIndex>,
    submitted: Arc<AtomicU64>,
    progress: watch::Receiver<ProgressSnapshot>,
    workers: Vec<JoinHandle<()>>,
    collector: JoinHandle<ProgressSnapshot>,
    cancel: CancellationToken,
}

impl FetchPool {
    /// Queues indices behind anything already submitted; returns how many were queued.
    pub fn submit<I: IntoIterator<Item = SegmentIndex>>(&self, indices: I) -> usize {
        let indices: Vec<SegmentIndex> = indices.into_iter().collect();
        self.submitted.fetch_add(indices.len() as u64, Ordering::SeqCst);
        let mut queued = 0;
        for index in indices {
            if self.queue.send(index).is_err() {
                break;
            }
            queued += 1;
        }
        queued
    }

    pub fn progress(&self) -> ProgressSnapshot {
        *self.progress.borrow()
    }

    /// Resolves once every submitted index has completed, or on cancellation.
    pub async fn wait_idle(&mut self) {
        loop {
            if self.cancel.is_cancelled() || self.progress.borrow().completed >= self.submitted.load(Ordering::SeqCst) {
                return;
            }
            tokio::select! {
                changed = self.progress.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Closes the queue, lets workers drain it (or stop, if cancelled) and returns the final tally.
    pub async fn finish(self) -> ProgressSnapshot {
        let FetchPool { queue, progress, workers, collector, .. } = self;
        drop(queue);
        for joined in futures::future::join_all(workers).await {
            if let Err(e) = joined {
                warn!(error = %e, "segment worker ended abnormally");
            }
        }
        match collector.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "progress collector ended abnormally");
                let last = *progress.borrow();
                last
            }
        }
    }
}

struct SegmentWorker {
    fetch: Arc<dyn HttpFetch>,
    headers: RequestHeaders,
    policy: RetryPolicy,
    cancel: CancellationToken,
    tracker: SharedTracker,
}

impl SegmentWorker {
    async fn download(&self, url: &str) -> Result<Bytes, FetchError> {
        let body = self
            .fetch
            .get(url, &self.headers, self.policy.attempt_timeout)
            .await?
            .into_success(url)?;
        if body.is_empty() {
            return Err(FetchError::EmptyBody { url: url.to_string() });
        }
        Ok(body)
    }

    async fn fetch_segment(&self, index: SegmentIndex) -> Completion {
        let claim = self.tracker.lock().await.claim(index);
        let (url, path) = match claim {
            Claim::Ready { url, path } => (url, path),
            Claim::AlreadyDone => return Completion { index, attempts: 0, outcome: FetchOutcome::Skipped },
            Claim::Unavailable => return Completion { index, attempts: 0, outcome: FetchOutcome::Unclaimed },
        };

        if has_content(&path).await {
            debug!(index, path = %path.display(), "segment already on disk");
            self.tracker.lock().await.settle(index, SegmentStatus::Done, 0);
            return Completion { index, attempts: 0, outcome: FetchOutcome::Skipped };
        }

        let worker: &SegmentWorker = self;
        let target: &str = &url;
        let outcome = run_with_retry(&self.policy, &self.cancel, target, move |_| worker.download(target)).await;

        match outcome {
            RetryOutcome::Success { value: body, attempts } => match write_atomically(&path, &body).await {
                Ok(()) => {
                    self.tracker.lock().await.settle(index, SegmentStatus::Done, attempts);
                    Completion { index, attempts, outcome: FetchOutcome::Downloaded { bytes: body.len() as u64 } }
                }
                Err(e) => {
                    warn!(index, path = %path.display(), error = %e, "failed to store segment");
                    self.tracker.lock().await.settle(index, SegmentStatus::Failed, attempts);
                    Completion {
                        index,
                        attempts,
                        outcome: FetchOutcome::Failed { reason: format!("write {}: {}", path.display(), e) },
                    }
                }
            },
            RetryOutcome::Exhausted { error, attempts } => {
                self.tracker.lock().await.settle(index, SegmentStatus::Failed, attempts);
                Completion { index, attempts, outcome: FetchOutcome::Failed { reason: error.to_string() } }
            }
            RetryOutcome::Cancelled { attempts } => {
                self.tracker.lock().await.release(index, attempts);
                Completion { index, attempts, outcome: FetchOutcome::Cancelled }
            }
        }
    }
}

async fn run_worker(
    id: usize,
    worker: Arc<SegmentWorker>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<SegmentIndex>>>,
    done: mpsc::UnboundedSender<Completion>,
) {
    loop {
        let next = tokio::select! {
            _ = worker.cancel.cancelled() => None,
            next = async { queue.lock().await.recv().await } => next,
        };
        let Some(index) = next else { break };

        let completion = worker.fetch_segment(index).await;
        let cancelled = completion.outcome == FetchOutcome::Cancelled;
        if done.send(completion).is_err() || cancelled {
            break;
        }
    }
    debug!(worker = id, "segment worker stopped");
}

async fn collect(
    mut done: mpsc::UnboundedReceiver<Completion>,
    submitted: Arc<AtomicU64>,
    events: broadcast::Sender<ArchiveEvent>,
    progress: watch::Sender<ProgressSnapshot>,
) -> ProgressSnapshot {
    let started = Instant::now();
    let mut snapshot = ProgressSnapshot::default();

    while let Some(c) = done.recv().await {
        match &c.outcome {
            FetchOutcome::Downloaded { bytes } => {
                snapshot.downloaded += 1;
                snapshot.bytes += bytes;
            }
            FetchOutcome::Skipped => snapshot.skipped += 1,
            FetchOutcome::Failed { reason } => {
                snapshot.failed += 1;
                warn!(index = c.index, attempts = c.attempts, reason = %reason, "segment failed permanently");
                let _ = events.send(ArchiveEvent::SegmentFailed {
                    index: c.index,
                    attempts: c.attempts,
                    reason: reason.clone(),
                });
            }
            FetchOutcome::Unclaimed => {}
            FetchOutcome::Cancelled => continue,
        }

        snapshot.completed += 1;
        snapshot.total = submitted.load(Ordering::SeqCst);
        snapshot.elapsed = started.elapsed();
        if c.outcome != FetchOutcome::Unclaimed {
            let _ = events.send(ArchiveEvent::Progress(snapshot));
        }
        progress.send_replace(snapshot);
    }

    snapshot.total = submitted.load(Ordering::SeqCst);
    snapshot
}

async fn has_content(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// `<segment>.part`, where a body is written before it is renamed into place.
pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    PathBuf::from(partial)
}

/// Complete-or-absent: readers never see a half-written segment under its final name.
async fn write_atomically(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let partial = partial_path(path);
    tokio::fs::write(&partial, body).await?;
    tokio::fs::rename(&partial, path).await
}
