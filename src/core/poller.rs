use crate::core::error::FetchError;
use crate::core::events::ArchiveEvent;
use crate::core::fetcher::FetchPool;
use crate::core::model::{RequestHeaders, SegmentIndex};
use crate::core::retry::{run_with_retry, RetryOutcome, RetryPolicy};
use crate::core::tracker::SharedTracker;
use crate::plugins::registry::HttpFetch;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailStop {
    Cancelled,
    /// No new index for the whole cooldown window.
    Cooldown,
    /// Playlist could not be fetched within the retry budget.
    Unreachable(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailReport {
    pub stop: TailStop,
    pub polls: u64,
    pub discovered: u64,
}

pub struct LiveTailPoller {
    fetch: Arc<dyn HttpFetch>,
    headers: RequestHeaders,
    media_url: Url,
    policy: RetryPolicy,
    interval: Duration,
    cooldown: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<ArchiveEvent>,
}

impl LiveTailPoller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetch: Arc<dyn HttpFetch>,
        headers: RequestHeaders,
        media_url: Url,
        policy: RetryPolicy,
        interval: Duration,
        cooldown: Duration,
        cancel: CancellationToken,
        events: broadcast::Sender<ArchiveEvent>,
    ) -> Self {
        Self { fetch, headers, media_url, policy, interval, cooldown, cancel, events }
    }

    async fn fetch_playlist(&self) -> Result<String, FetchError> {
        let url = self.media_url.as_str();
        let body = self
            .fetch
            .get(url, &self.headers, self.policy.attempt_timeout)
            .await?
            .into_success(url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Polls until cancelled, quiet for `cooldown`, or the playlist is gone.
    /// New indices go straight into `pool`.
    pub async fn run(&self, tracker: &SharedTracker, pool: &FetchPool) -> TailReport {
        let mut polls = 0u64;
        let mut discovered = 0u64;
        let mut last_growth = Instant::now();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return TailReport { stop: TailStop::Cancelled, polls, discovered };
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            polls += 1;
            let poller: &LiveTailPoller = self;
            let snapshot = match run_with_retry(&self.policy, &self.cancel, self.media_url.as_str(), move |_| {
                poller.fetch_playlist()
            })
            .await
            {
                RetryOutcome::Success { value, .. } => value,
                RetryOutcome::Exhausted { error, attempts } => {
                    warn!(url = %self.media_url, attempts, error = %error, "live playlist unreachable, ending tail");
                    return TailReport { stop: TailStop::Unreachable(error), polls, discovered };
                }
                RetryOutcome::Cancelled { .. } => {
                    return TailReport { stop: TailStop::Cancelled, polls, discovered };
                }
            };

            let observed = tracker.lock().await.observe_live_playlist(&snapshot, &self.media_url);
            let fresh: Vec<SegmentIndex> = match observed {
                Ok(fresh) => fresh,
                Err(e) => {
                    warn!(error = %e, "live playlist snapshot rejected");
                    let _ = self.events.send(ArchiveEvent::Warning { scope: "live-tail".to_string(), message: e.to_string() });
                    vec![]
                }
            };

            match (fresh.first(), fresh.last()) {
                (Some(&first), Some(&last)) => {
                    info!(first, last, "new live segments");
                    let _ = self.events.send(ArchiveEvent::SegmentsDiscovered { first, last });
                    discovered += fresh.len() as u64;
                    pool.submit(fresh);
                    last_growth = Instant::now();
                }
                _ => {
                    debug!(polls, quiet_ms = last_growth.elapsed().as_millis() as u64, "no new segments");
                    if last_growth.elapsed() >= self.cooldown {
                        info!(polls, discovered, "live tail quiet for the cooldown window");
                        return TailReport { stop: TailStop::Cooldown, polls, discovered };
                    }
                }
            }
        }
    }
}
