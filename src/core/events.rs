use crate::core::model::{SegmentIndex, SessionId, SessionPhase, StreamVariant};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum ArchiveEvent {
    PhaseChanged { session_id: SessionId, phase: SessionPhase },
    VariantSelected { variant: StreamVariant },
    Resolved { media_url: String, horizon: SegmentIndex, prefix: String, suffix: String },
    /// Where segments are written; pass it back as `--work-dir` to resume.
    WorkDirReady { path: PathBuf },
    SegmentsDiscovered { first: SegmentIndex, last: SegmentIndex },
    SegmentFailed { index: SegmentIndex, attempts: u32, reason: String },
    Progress(ProgressSnapshot),
    Warning { scope: String, message: String },
    Info { scope: String, message: String },
}
