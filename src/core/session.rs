use crate::core::assembler::{AssemblyReport, OrderedAssembler};
use crate::core::config::ArchiveConfig;
use crate::core::error::ArchiveError;
use crate::core::events::{ArchiveEvent, ProgressSnapshot};
use crate::core::fetcher::{partial_path, ConcurrentSegmentFetcher};
use crate::core::model::*;
use crate::core::poller::{LiveTailPoller, TailReport, TailStop};
use crate::core::resolver::{PlaylistResolver, ResolvedStream};
use crate::core::tracker::SegmentIndexTracker;
use crate::plugins::registry::HttpFetch;
use sanitize_filename::sanitize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name of the assembled file inside the working directory, before it is moved out.
pub const STAGED_ARTIFACT: &str = "assembled.ts";

#[derive(Debug)]
pub enum SessionOutcome {
    Completed { output: PathBuf },
    CompletedWithGaps { output: PathBuf, skipped: Vec<SegmentIndex> },
    Failed { cause: ArchiveError },
}

#[derive(Debug)]
pub struct SessionReport {
    pub session_id: SessionId,
    /// Always terminal.
    pub phase: SessionPhase,
    pub outcome: SessionOutcome,
    pub variant: Option<StreamVariant>,
    pub work_dir: Option<PathBuf>,
    pub progress: ProgressSnapshot,
    pub tail: Option<TailReport>,
    /// Working directory could not be removed; the artifact is still valid.
    pub cleanup_warning: Option<String>,
}

pub struct ArchiveSession {
    id: SessionId,
    request: ArchiveRequest,
    config: ArchiveConfig,
    fetch: Arc<dyn HttpFetch>,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<ArchiveEvent>,
}

impl ArchiveSession {
    pub fn new(request: ArchiveRequest, config: ArchiveConfig, fetch: Arc<dyn HttpFetch>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            id: Uuid::new_v4(),
            request,
            config,
            fetch,
            cancel: CancellationToken::new(),
            event_tx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ArchiveEvent> {
        self.event_tx.subscribe()
    }

    /// Cancelling stops the fetch pool and the live tail; whatever finished is still assembled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn enter(&self, phase: SessionPhase) {
        info!(session = %self.id, ?phase, "session phase");
        let _ = self.event_tx.send(ArchiveEvent::PhaseChanged { session_id: self.id, phase });
    }

    fn notify(&self, event: ArchiveEvent) {
        let _ = self.event_tx.send(event);
    }

    pub async fn run(self) -> SessionReport {
        self.enter(SessionPhase::Resolving);
        let resolver = PlaylistResolver::new(
            Arc::clone(&self.fetch),
            self.request.headers.clone(),
            self.config.playlist_timeout,
        );
        let resolved = match resolver.resolve(&self.request.reference, &self.request.preference).await {
            Ok(r) => r,
            Err(cause) => {
                warn!(session = %self.id, error = %cause, "resolution failed");
                return self.fail(cause, None, None);
            }
        };
        self.announce(&resolved);

        let destination = self.destination(resolved.variant.as_ref());
        let work_dir = self.work_dir_path(&destination);

        let mut tracker =
            SegmentIndexTracker::new(resolved.scheme.clone(), &work_dir).with_limit(self.config.max_segments);
        let backlog = match tracker.register_range(resolved.horizon) {
            Ok(b) => b,
            Err(cause) => {
                warn!(session = %self.id, error = %cause, "backlog too large");
                return self.fail(cause.into(), resolved.variant, None);
            }
        };
        let tracker = tracker.into_shared();

        let created = match self.prepare_work_dir(&work_dir).await {
            Ok(created) => created,
            Err(cause) => return self.fail(cause, resolved.variant, None),
        };

        self.enter(SessionPhase::BackfillDownload);
        let mut pool = ConcurrentSegmentFetcher::new(
            Arc::clone(&self.fetch),
            self.request.headers.clone(),
            self.config.retry,
            self.config.concurrency,
            self.cancel.clone(),
            self.event_tx.clone(),
        )
        .spawn(Arc::clone(&tracker));
        pool.submit(backlog);
        pool.wait_idle().await;
        debug!(session = %self.id, progress = ?pool.progress(), "backlog drained");

        self.enter(SessionPhase::LiveTail);
        let tail = LiveTailPoller::new(
            Arc::clone(&self.fetch),
            self.request.headers.clone(),
            resolved.media_url.clone(),
            self.config.retry,
            self.config.poll_interval,
            self.config.tail_cooldown,
            self.cancel.clone(),
            self.event_tx.clone(),
        )
        .run(&tracker, &pool)
        .await;
        if let TailStop::Unreachable(e) = &tail.stop {
            self.notify(ArchiveEvent::Warning { scope: "live-tail".to_string(), message: e.to_string() });
        }
        pool.wait_idle().await;
        let progress = pool.finish().await;

        self.enter(SessionPhase::Assembling);
        let segments = tracker.lock().await.snapshot();
        let assembled = self.assemble(&segments, &work_dir, &destination).await;

        self.enter(SessionPhase::Cleanup);
        let cleanup_warning = self.cleanup(&work_dir, created, &segments).await;

        let outcome = match assembled {
            Ok(r) if r.skipped.is_empty() => SessionOutcome::Completed { output: destination },
            Ok(r) => SessionOutcome::CompletedWithGaps { output: destination, skipped: r.skipped },
            Err(cause) => {
                warn!(session = %self.id, error = %cause, "assembly failed");
                SessionOutcome::Failed { cause }
            }
        };
        let phase = match &outcome {
            SessionOutcome::Completed { .. } => SessionPhase::Completed,
            SessionOutcome::CompletedWithGaps { .. } => SessionPhase::CompletedWithGaps,
            SessionOutcome::Failed { .. } => SessionPhase::Failed,
        };
        self.enter(phase);

        SessionReport {
            session_id: self.id,
            phase,
            outcome,
            variant: resolved.variant,
            work_dir: Some(work_dir),
            progress,
            tail: Some(tail),
            cleanup_warning,
        }
    }

    fn fail(self, cause: ArchiveError, variant: Option<StreamVariant>, work_dir: Option<PathBuf>) -> SessionReport {
        self.enter(SessionPhase::Failed);
        SessionReport {
            session_id: self.id,
            phase: SessionPhase::Failed,
            outcome: SessionOutcome::Failed { cause },
            variant,
            work_dir,
            progress: ProgressSnapshot::default(),
            tail: None,
            cleanup_warning: None,
        }
    }

    fn announce(&self, resolved: &ResolvedStream) {
        match &resolved.variant {
            Some(v) => self.notify(ArchiveEvent::VariantSelected { variant: v.clone() }),
            None => self.notify(ArchiveEvent::Info {
                scope: "resolve".to_string(),
                message: format!("using {} as the media playlist", resolved.media_url),
            }),
        }
        self.notify(ArchiveEvent::Resolved {
            media_url: resolved.media_url.to_string(),
            horizon: resolved.horizon,
            prefix: resolved.scheme.prefix.clone(),
            suffix: resolved.scheme.suffix.clone(),
        });
    }

    fn destination(&self, variant: Option<&StreamVariant>) -> PathBuf {
        match &self.request.destination {
            Some(p) => p.clone(),
            None => PathBuf::from(default_output_name(variant, self.id)),
        }
    }

    fn work_dir_path(&self, destination: &Path) -> PathBuf {
        match &self.config.work_dir {
            Some(d) => d.clone(),
            None => {
                let root = destination
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                root.join(work_dir_name(self.id))
            }
        }
    }

    /// Returns whether this session created the directory.
    async fn prepare_work_dir(&self, dir: &Path) -> Result<bool, ArchiveError> {
        let created = tokio::fs::metadata(dir).await.is_err();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ArchiveError::fs("create working directory", dir, e))?;
        info!(session = %self.id, work_dir = %dir.display(), created, "working directory ready");
        self.notify(ArchiveEvent::WorkDirReady { path: dir.to_path_buf() });
        Ok(created)
    }

    async fn assemble(
        &self,
        segments: &[SegmentRef],
        work_dir: &Path,
        destination: &Path,
    ) -> Result<AssemblyReport, ArchiveError> {
        let report = OrderedAssembler::new(work_dir.join(STAGED_ARTIFACT)).assemble(segments).await?;
        publish(&report.output, destination).await?;
        if !report.skipped.is_empty() {
            warn!(session = %self.id, gaps = ?report.skipped, "archive has gaps");
        }
        info!(
            session = %self.id,
            output = %destination.display(),
            segments = report.segments_written,
            bytes = report.bytes_written,
            "archive written"
        );
        Ok(report)
    }

    /// Never fails the session; a removal error comes back as a warning.
    ///
    /// A directory the session created is removed whole. A directory that already
    /// existed only loses the files this session names: segments, their `.part`
    /// siblings and the staged artifact.
    async fn cleanup(&self, work_dir: &Path, created: bool, segments: &[SegmentRef]) -> Option<String> {
        if self.config.keep_segments {
            info!(session = %self.id, work_dir = %work_dir.display(), "keeping segments");
            return None;
        }
        let message = if created {
            match tokio::fs::remove_dir_all(work_dir).await {
                Ok(()) => return None,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
                Err(e) => format!("could not remove {}: {}", work_dir.display(), e),
            }
        } else {
            let owned = segments
                .iter()
                .flat_map(|seg| [seg.path.clone(), partial_path(&seg.path)])
                .chain(std::iter::once(work_dir.join(STAGED_ARTIFACT)));
            let mut failed = vec![];
            for path in owned {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => failed.push(format!("{}: {}", path.display(), e)),
                }
            }
            if failed.is_empty() {
                debug!(session = %self.id, work_dir = %work_dir.display(), "segment files removed, directory kept");
                return None;
            }
            format!("could not remove {} file(s) in {}: {}", failed.len(), work_dir.display(), failed[0])
        };
        warn!(session = %self.id, "{}", message);
        self.notify(ArchiveEvent::Warning { scope: "cleanup".to_string(), message: message.clone() });
        Some(message)
    }
}

/// Moves the staged artifact to its destination, copying when a rename cannot cross filesystems.
async fn publish(staged: &Path, destination: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ArchiveError::fs("create directory", parent, e))?;
    }
    if tokio::fs::metadata(destination).await.is_ok() {
        let _ = tokio::fs::remove_file(destination).await;
    }
    if let Err(e) = tokio::fs::rename(staged, destination).await {
        debug!(error = %e, "rename failed, copying instead");
        tokio::fs::copy(staged, destination)
            .await
            .map_err(|e| ArchiveError::fs("copy archive to", destination, e))?;
        let _ = tokio::fs::remove_file(staged).await;
    }
    Ok(())
}

fn work_dir_name(id: SessionId) -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let simple = id.simple().to_string();
    format!("hls-archive-{}-{}", secs, &simple[..8])
}

/// `HLS_Stream_<res>_<bandwidth>.ts`, e.g. `HLS_Stream_1280x720_2p50_Mbps.ts`.
pub fn default_output_name(variant: Option<&StreamVariant>, id: SessionId) -> String {
    let name = match variant {
        Some(v) => format!(
            "HLS_Stream_{}_{}.ts",
            v.resolution_label(),
            v.bandwidth_label().replace(' ', "_").replace('.', "p")
        ),
        None => format!("HLS_Stream_{}.ts", &id.simple().to_string()[..8]),
    };
    sanitize(name)
}
