// ── Bounded readiness polling ──
//
// Repeats a probe until it reports ready, a wall-clock deadline passes,
// or the run is cancelled. The deadline bounds the whole loop, so a probe
// that hangs or a sleep in progress is cut short when time runs out.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a single probe saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Ready,
    Pending,
}

impl From<bool> for Probe {
    fn from(ready: bool) -> Self {
        if ready { Self::Ready } else { Self::Pending }
    }
}

/// How a poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PollStatus {
    /// A probe reported ready.
    Converged,
    /// The deadline passed first.
    TimedOut,
    /// The timeout was zero, so no probe ran.
    Skipped,
    /// The cancellation token fired.
    Cancelled,
}

impl PollStatus {
    /// Whether the caller may carry on with the next step.
    pub fn may_proceed(self) -> bool {
        matches!(self, Self::Converged | Self::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    pub status: PollStatus,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl PollOutcome {
    pub fn skipped() -> Self {
        Self {
            status: PollStatus::Skipped,
            elapsed: Duration::ZERO,
            attempts: 0,
        }
    }
}

/// Deadline-bounded probe loop.
///
/// ```ignore
/// let poller = Poller::new(Duration::from_secs(60), Duration::from_secs(5), cancel);
/// let outcome = poller
///     .run("controller", || async { client.check_ready(id).await.map(Probe::from) })
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct Poller {
    timeout: Duration,
    interval: Duration,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            timeout,
            interval,
            cancel,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe until ready, timed out or cancelled.
    ///
    /// Probe errors count as "not ready yet": they are logged and the loop
    /// keeps going. No sleep follows a probe that reports ready.
    pub async fn run<F, Fut, E>(&self, label: &str, mut probe: F) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe, E>>,
        E: Display,
    {
        if self.timeout.is_zero() {
            debug!(label, "wait disabled");
            return PollOutcome::skipped();
        }

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempts: u32 = 0;

        let polling = async {
            loop {
                attempts += 1;
                match probe().await {
                    Ok(Probe::Ready) => return,
                    Ok(Probe::Pending) => debug!(label, attempt = attempts, "not ready yet"),
                    Err(e) => debug!(label, attempt = attempts, error = %e, "still waiting"),
                }
                tokio::time::sleep(self.interval).await;
            }
        };

        let status = tokio::select! {
            biased;
            () = self.cancel.cancelled() => PollStatus::Cancelled,
            result = tokio::time::timeout_at(deadline, polling) => match result {
                Ok(()) => PollStatus::Converged,
                Err(_) => PollStatus::TimedOut,
            },
        };

        let elapsed = started.elapsed();
        let took = humantime::format_duration(Duration::from_millis(
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        ));
        match status {
            PollStatus::Converged => info!(label, attempts, elapsed = %took, "ready"),
            PollStatus::TimedOut => warn!(label, attempts, elapsed = %took, "gave up waiting"),
            PollStatus::Cancelled => info!(label, attempts, "wait cancelled"),
            PollStatus::Skipped => {}
        }

        PollOutcome {
            status,
            elapsed,
            attempts,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    const T: Duration = Duration::from_secs(30);
    const I: Duration = Duration::from_secs(4);

    fn poller(timeout: Duration) -> Poller {
        Poller::new(timeout, I, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_times_out_at_deadline() {
        let outcome = poller(T)
            .run("test", || async { Ok::<_, String>(Probe::Pending) })
            .await;

        assert_eq!(outcome.status, PollStatus::TimedOut);
        assert!(outcome.elapsed >= T && outcome.elapsed < T + I, "{outcome:?}");
        // Probes at 0, 4, ..., 28.
        assert_eq!(outcome.attempts, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn converges_on_third_probe_without_trailing_sleep() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poller(T)
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok::<_, String>(Probe::from(n == 3))
                }
            })
            .await;

        assert_eq!(outcome.status, PollStatus::Converged);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.elapsed >= 2 * I && outcome.elapsed < 3 * I, "{outcome:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_is_cut_off_at_deadline() {
        let outcome = poller(Duration::from_secs(5))
            .run("test", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, String>(Probe::Ready)
            })
            .await;

        assert_eq!(outcome.status, PollStatus::TimedOut);
        assert_eq!(outcome.elapsed, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_errors_are_swallowed() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poller(T)
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("connection refused".to_owned())
                    } else {
                        Ok(Probe::Ready)
                    }
                }
            })
            .await;

        assert_eq!(outcome.status, PollStatus::Converged);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_skips_without_probing() {
        let calls = Arc::new(AtomicU32::new(0));
        let outcome = poller(Duration::ZERO)
            .run("test", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(Probe::Ready)
                }
            })
            .await;

        assert_eq!(outcome, PollOutcome::skipped());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(outcome.status.may_proceed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_the_wait() {
        let cancel = CancellationToken::new();
        let poller = Poller::new(T, I, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(6)).await;
            trigger.cancel();
        });

        let outcome = poller
            .run("test", || async { Ok::<_, String>(Probe::Pending) })
            .await;

        assert_eq!(outcome.status, PollStatus::Cancelled);
        assert!(!outcome.status.may_proceed());
        assert_eq!(outcome.elapsed, Duration::from_secs(6));
    }

    #[test]
    fn status_display_is_kebab_case() {
        assert_eq!(PollStatus::TimedOut.to_string(), "timed-out");
    }
}
