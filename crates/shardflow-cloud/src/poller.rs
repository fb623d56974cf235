//! Waiting for asynchronous remote operations
//!
//! Every long-running call against the control plane returns immediately; its
//! completion is only observable through later status reads. `StateWaiter` is
//! the single poll loop used for all of them: it knows nothing about clusters,
//! only about a fetch function, a set of pending statuses and a target.

use crate::error::{CloudError, Result};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Deadline used when a timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Timing policy for status polling
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Wait before the first poll, so the remote side can register the transition
    pub delay: Duration,

    /// Floor between two polls
    pub min_interval: Duration,

    /// Ceiling between two polls
    pub max_interval: Duration,

    /// Backoff multiplier applied after every pending poll
    pub backoff_multiplier: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            min_interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl PollPolicy {
    /// Interval to sleep after the `attempt`-th pending poll (0-based)
    pub fn interval_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt.min(32) as i32);
        let scaled = self.min_interval.as_secs_f64() * factor;
        let capped = scaled.min(self.max_interval.as_secs_f64());
        // Saturate instead of panicking when the ceiling is effectively unbounded
        Duration::try_from_secs_f64(capped)
            .unwrap_or(self.max_interval)
            .max(self.min_interval)
    }
}

/// Polls a status until it reaches a target
#[derive(Debug, Clone)]
pub struct StateWaiter<S> {
    /// What is being waited on, for diagnostics (e.g. "cluster c-1")
    subject: String,
    pending: Vec<S>,
    target: S,
    timeout: Duration,
    policy: PollPolicy,
}

impl<S> StateWaiter<S>
where
    S: PartialEq + fmt::Display,
{
    pub fn new(subject: impl Into<String>, pending: Vec<S>, target: S, timeout: Duration) -> Self {
        Self {
            subject: subject.into(),
            pending,
            target,
            timeout,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Poll `fetch` until it reports the target status.
    ///
    /// Returns `Timeout` when the deadline passes while the status is pending,
    /// `UnexpectedState` as soon as a status is neither pending nor the target,
    /// `TransientFetch` when `fetch` itself fails, and `Cancelled` when the
    /// shutdown signal flips to `true`.
    pub async fn wait<F, Fut>(
        &self,
        mut fetch: F,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<S>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        let started = Instant::now();
        let deadline = after(started, self.timeout, started + FAR_FUTURE);
        let mut last_status = String::from("unknown");
        let mut attempt: u32 = 0;

        tracing::debug!(
            "Waiting for {} to become {} (timeout {:?})",
            self.subject,
            self.target,
            self.timeout
        );

        self.sleep_until(after(started, self.policy.delay, deadline), shutdown)
            .await?;

        loop {
            if Instant::now() >= deadline {
                return Err(self.timeout_error(last_status));
            }

            let fetched = tokio::select! {
                biased;
                _ = cancelled(shutdown) => return Err(self.cancelled_error()),
                result = tokio::time::timeout_at(deadline, fetch()) => result,
            };

            let status = match fetched {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    return Err(CloudError::TransientFetch {
                        target: self.subject.clone(),
                        source: Box::new(e),
                    });
                }
                Err(_) => return Err(self.timeout_error(last_status)),
            };

            if status == self.target {
                tracing::debug!(
                    "{} reached {} after {:?}",
                    self.subject,
                    status,
                    started.elapsed()
                );
                return Ok(status);
            }

            if !self.pending.contains(&status) {
                return Err(CloudError::UnexpectedState {
                    target: self.subject.clone(),
                    status: status.to_string(),
                    expected: self.target.to_string(),
                });
            }

            last_status = status.to_string();
            let interval = self.policy.interval_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!(
                "{} is {}, next poll in {:?}",
                self.subject,
                last_status,
                interval
            );

            self.sleep_until(after(Instant::now(), interval, deadline), shutdown)
                .await?;
        }
    }

    async fn sleep_until(&self, at: Instant, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancelled(shutdown) => Err(self.cancelled_error()),
            _ = tokio::time::sleep_until(at) => Ok(()),
        }
    }

    fn timeout_error(&self, last_status: String) -> CloudError {
        CloudError::Timeout {
            target: self.subject.clone(),
            expected: self.target.to_string(),
            last_status,
            timeout: self.timeout,
        }
    }

    fn cancelled_error(&self) -> CloudError {
        CloudError::Cancelled {
            target: self.subject.clone(),
        }
    }
}

/// `from + by`, never later than `cap`
fn after(from: Instant, by: Duration, cap: Instant) -> Instant {
    from.checked_add(by).map_or(cap, |at| at.min(cap))
}

/// Resolves once the shutdown flag is `true`; never resolves if the sender is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::OperationStatus;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn policy() -> PollPolicy {
        PollPolicy {
            delay: Duration::from_secs(10),
            min_interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    fn waiter(timeout: Duration) -> StateWaiter<OperationStatus> {
        StateWaiter::new(
            "cluster c-1",
            vec![OperationStatus::Building],
            OperationStatus::Active,
            timeout,
        )
        .with_policy(policy())
    }

    /// Fetch function replaying a script; repeats the last status once exhausted
    fn scripted(
        statuses: Vec<OperationStatus>,
    ) -> (
        Arc<AtomicUsize>,
        impl FnMut() -> std::future::Ready<Result<OperationStatus>>,
    ) {
        let calls = Arc::new(AtomicUsize::new(0));
        let script = Arc::new(Mutex::new(VecDeque::from(statuses)));
        let counter = calls.clone();
        let fetch = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut script = script.lock().unwrap();
            let status = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            };
            std::future::ready(Ok(status))
        };
        (calls, fetch)
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[test]
    fn test_interval_backoff_is_bounded() {
        let policy = policy();
        assert_eq!(policy.interval_for_attempt(0), Duration::from_secs(3));
        assert_eq!(policy.interval_for_attempt(1), Duration::from_secs(6));
        assert_eq!(policy.interval_for_attempt(2), Duration::from_secs(10));
        assert_eq!(policy.interval_for_attempt(40), Duration::from_secs(10));

        let flat = PollPolicy {
            backoff_multiplier: 0.5,
            ..policy
        };
        assert_eq!(flat.interval_for_attempt(5), Duration::from_secs(3));
    }

    #[test]
    fn test_unbounded_ceiling_saturates() {
        let policy = PollPolicy {
            delay: Duration::ZERO,
            min_interval: Duration::from_secs(1),
            max_interval: Duration::MAX,
            backoff_multiplier: 1e300,
        };
        assert_eq!(policy.interval_for_attempt(5), Duration::MAX);

        let steep = PollPolicy {
            backoff_multiplier: 4.0,
            ..policy
        };
        assert_eq!(steep.interval_for_attempt(0), Duration::from_secs(1));
        assert!(steep.interval_for_attempt(40) >= Duration::from_secs(1 << 62));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_waits_for_delay() {
        let (calls, fetch) = scripted(vec![OperationStatus::Active]);
        let started = Instant::now();

        let status = waiter(Duration::from_secs(60))
            .wait(fetch, &mut no_shutdown())
            .await
            .unwrap();

        assert_eq!(status, OperationStatus::Active);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_target_backs_off() {
        let (calls, fetch) = scripted(vec![
            OperationStatus::Building,
            OperationStatus::Building,
            OperationStatus::Active,
        ]);
        let started = Instant::now();

        waiter(Duration::from_secs(120))
            .wait(fetch, &mut no_shutdown())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // delay 10s, then 3s, then 6s
        assert_eq!(started.elapsed(), Duration::from_secs(19));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_shorter_than_delay_never_fetches() {
        let (calls, fetch) = scripted(vec![OperationStatus::Active]);
        let started = Instant::now();

        let err = waiter(Duration::from_secs(4))
            .wait(fetch, &mut no_shutdown())
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Timeout { .. }));
        assert!(calls.load(Ordering::SeqCst) <= 1);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ceiling_sleeps_to_deadline() {
        let (calls, fetch) = scripted(vec![OperationStatus::Building]);
        let started = Instant::now();
        let unbounded = PollPolicy {
            max_interval: Duration::MAX,
            backoff_multiplier: 1e300,
            ..policy()
        };

        let err = waiter(Duration::from_secs(60))
            .with_policy(unbounded)
            .wait(fetch, &mut no_shutdown())
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Timeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_forever_times_out_within_budget() {
        let (calls, fetch) = scripted(vec![OperationStatus::Building]);
        let started = Instant::now();

        let err = waiter(Duration::from_secs(45))
            .wait(fetch, &mut no_shutdown())
            .await
            .unwrap_err();

        match err {
            CloudError::Timeout { last_status, .. } => assert_eq!(last_status, "building"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(started.elapsed() <= Duration::from_secs(45));
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_fails_fast() {
        let (calls, fetch) = scripted(vec![OperationStatus::Error]);
        let started = Instant::now();

        let err = waiter(Duration::from_secs(3600))
            .wait(fetch, &mut no_shutdown())
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::UnexpectedState { ref status, .. } if status == "error"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_propagates() {
        let fetch = || {
            std::future::ready(Err::<OperationStatus, _>(CloudError::Api(
                "503".to_string(),
            )))
        };

        let err = waiter(Duration::from_secs(60))
            .wait(fetch, &mut no_shutdown())
            .await
            .unwrap_err();

        match err {
            CloudError::TransientFetch { source, .. } => {
                assert!(matches!(*source, CloudError::Api(ref m) if m == "503"))
            }
            other => panic!("expected transient fetch error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let (calls, fetch) = scripted(vec![OperationStatus::Building]);
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            let _ = tx.send(true);
        });

        let err = waiter(Duration::from_secs(3600))
            .wait(fetch, &mut rx)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Cancelled { .. }));
        // polls at 10s and 13s, cancelled before the one at 19s
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_returns_before_first_poll() {
        let (calls, fetch) = scripted(vec![OperationStatus::Active]);
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = waiter(Duration::from_secs(60))
            .wait(fetch, &mut rx)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Cancelled { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
