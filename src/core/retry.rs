use crate::core::error::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Fixed-delay retry budget for one network operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// Pause between attempts; not scaled by attempt number.
    pub delay: Duration,
    /// Hard limit on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success { value: T, attempts: u32 },
    /// Budget spent, or the error was not transient.
    Exhausted { error: FetchError, attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Runs `op` until it succeeds, the budget runs out, or `cancel` fires.
///
/// `op` receives the 1-based attempt number. Each attempt is bounded by
/// `policy.attempt_timeout`; an attempt still in flight when `cancel` fires is
/// dropped.
pub async fn run_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    url: &str,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled { attempts: attempt };
        }
        attempt += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts: attempt },
            r = tokio::time::timeout(policy.attempt_timeout, op(attempt)) => r,
        };

        let error = match result {
            Ok(Ok(value)) => return RetryOutcome::Success { value, attempts: attempt },
            Ok(Err(e)) => e,
            Err(_) => FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: policy.attempt_timeout.as_millis() as u64,
            },
        };

        if !error.is_transient() || attempt >= max_attempts {
            return RetryOutcome::Exhausted { error, attempts: attempt };
        }

        warn!(
            url,
            attempt,
            max = max_attempts,
            delay_ms = policy.delay.as_millis() as u64,
            error = %error,
            "retrying after transient error"
        );
        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts: attempt },
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}
