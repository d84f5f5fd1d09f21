use crate::core::retry::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on tracked segment indices.
pub const DEFAULT_MAX_SEGMENTS: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Simultaneous segment requests.
    pub concurrency: usize,
    /// Applies to segment fetches and live playlist polls.
    pub retry: RetryPolicy,
    /// Timeout for the playlist requests made while resolving.
    pub playlist_timeout: Duration,
    pub poll_interval: Duration,
    /// Live tail ends after this long without a new segment index.
    pub tail_cooldown: Duration,
    pub user_agent: String,
    /// Reuse this directory instead of creating a fresh one; segments already in it are skipped.
    pub work_dir: Option<PathBuf>,
    pub keep_segments: bool,
    /// Sessions whose segment index reaches this are refused.
    pub max_segments: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryPolicy::default(),
            playlist_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(5),
            tail_cooldown: Duration::from_secs(60),
            user_agent: "hls-archiver/0.1".to_string(),
            work_dir: None,
            keep_segments: false,
            max_segments: DEFAULT_MAX_SEGMENTS,
        }
    }
}
