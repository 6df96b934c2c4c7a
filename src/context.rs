/*!
 * Per-call context: cancellation, deadline and attempt number
 */

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Cancellation and deadline carried by every call through the client
///
/// Cloning shares the cancellation token, so cancelling any clone cancels
/// the call. Retries run under child contexts derived with a tighter
/// deadline; cancelling the parent cancels every child.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    attempt: u32,
}

impl CallContext {
    /// A context with no deadline that is never cancelled unless asked to
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the deadline `timeout` from now
    ///
    /// Timeouts too large to represent saturate to a far-future deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| far_future(now));
        self.with_deadline(deadline)
    }

    /// Set an absolute deadline, keeping the earlier one if already set
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; zero once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True once the context is cancelled or its deadline has passed
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// 1-based attempt number stamped by the retry layer, 0 outside of it
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Derive the context for one attempt of a retried call
    pub(crate) fn for_attempt(&self, attempt: u32, timeout: Option<Duration>) -> Self {
        let mut child = Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            attempt,
        };
        if let Some(timeout) = timeout {
            child = child.with_timeout(timeout);
        }
        child
    }

    /// Drive `fut` until it completes, the context is cancelled, or the deadline passes
    ///
    /// Cancellation resolves to `Cancelled`, the deadline to `DeadlineExceeded`.
    /// `fut` is dropped as soon as either fires.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Status>
    where
        F: Future<Output = Result<T, Status>>,
    {
        let deadline = self.deadline;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Status::cancelled("context canceled")),
            _ = sleep_until(deadline) => Err(Status::deadline_exceeded("context deadline exceeded")),
            result = fut => result,
        }
    }
}

/// Roughly 30 years from `now`, the same horizon tokio uses for unbounded sleeps
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_without_deadline() {
        let ctx = CallContext::new();
        let result = ctx.run(async { Ok::<_, Status>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_hits_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_millis(100));

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, Status>(())
            })
            .await;

        assert_eq!(result.unwrap_err().code(), Code::DeadlineExceeded);
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_observes_cancellation() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, Status>(())
            })
            .await;

        assert_eq!(result.unwrap_err().code(), Code::Cancelled);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_context_takes_tighter_deadline() {
        let parent = CallContext::new().with_timeout(Duration::from_secs(1));

        let tight = parent.for_attempt(1, Some(Duration::from_millis(200)));
        assert_eq!(tight.attempt(), 1);
        assert!(tight.deadline() < parent.deadline());

        let loose = parent.for_attempt(2, Some(Duration::from_secs(5)));
        assert_eq!(loose.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_cancelling_parent_cancels_attempt() {
        let parent = CallContext::new();
        let child = parent.for_attempt(1, None);

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(child.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_saturates() {
        let ctx = CallContext::new().with_timeout(Duration::MAX);

        let deadline = ctx.deadline().unwrap();
        assert!(deadline > Instant::now() + Duration::from_secs(86400 * 365));
        assert!(!ctx.is_done());

        let child = ctx.for_attempt(1, Some(Duration::MAX));
        assert_eq!(child.deadline(), Some(deadline));
    }

    #[test]
    fn test_with_deadline_keeps_earliest() {
        let now = Instant::now();
        let ctx = CallContext::new()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(5));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }
}
