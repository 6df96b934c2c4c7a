/*!
 * Retry interceptor with per-attempt timeout and backoff
 */

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tonic::{Code, Status};
use tracing::debug;

use super::{Message, MethodName, Next, UnaryInterceptor};
use crate::context::CallContext;

/// Status codes retried by default
pub const DEFAULT_RETRY_CODES: [Code; 3] = [Code::NotFound, Code::Aborted, Code::DeadlineExceeded];

/// Wait inserted between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Retry immediately
    None,
    /// Constant wait, scaled by a random factor in `1 ± jitter`
    Linear { wait: Duration, jitter: f64 },
    /// `initial * multiplier^(retry - 1)`, capped at `max`, then jittered
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        jitter: f64,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear {
            wait: Duration::from_millis(50),
            jitter: 0.10,
        }
    }
}

impl Backoff {
    /// Delay before retry number `retry` (1 for the first retry)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear { wait, jitter } => jittered(wait, jitter),
            Backoff::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let scaled = initial.as_secs_f64() * multiplier.powi(exponent);
                let capped = scaled.min(max.as_secs_f64()).max(0.0);
                let delay = Duration::try_from_secs_f64(capped).unwrap_or(max);
                jittered(delay, jitter)
            }
        }
    }
}

/// Scale `delay` by a random factor in `1 ± jitter`, with jitter clamped to `[0, 1]`
fn jittered(delay: Duration, jitter: f64) -> Duration {
    let jitter = if jitter.is_nan() {
        0.0
    } else {
        jitter.clamp(0.0, 1.0)
    };
    if jitter == 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = 1.0 + rand::rng().random_range(-jitter..=jitter);
    Duration::try_from_secs_f64((delay.as_secs_f64() * factor).max(0.0)).unwrap_or(Duration::MAX)
}

/// When and how often a failed call is attempted again
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Status codes that trigger a retry
    pub codes: Vec<Code>,
    /// Deadline applied to each attempt on its own
    pub per_retry_timeout: Option<Duration>,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            codes: DEFAULT_RETRY_CODES.to_vec(),
            per_retry_timeout: None,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Default codes and backoff with the given retry budget and per-attempt timeout
    pub fn new(max_retries: u32, per_retry_timeout: Duration) -> Self {
        Self {
            max_retries,
            per_retry_timeout: Some(per_retry_timeout),
            ..Default::default()
        }
    }

    pub fn with_codes(mut self, codes: impl IntoIterator<Item = Code>) -> Self {
        self.codes = codes.into_iter().collect();
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn is_retryable(&self, code: Code) -> bool {
        self.codes.contains(&code)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Re-runs the rest of the chain on retryable failures
///
/// Each attempt gets its own child context bounded by the per-retry
/// timeout. Once the caller's context is cancelled or past its deadline no
/// further attempt is made, including while waiting out the backoff.
#[derive(Debug, Clone, Default)]
pub struct RetryInterceptor {
    policy: RetryPolicy,
}

impl RetryInterceptor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn should_retry(&self, status: &Status, attempt_ctx: &CallContext) -> bool {
        if self.policy.is_retryable(status.code()) {
            return true;
        }
        // The attempt's own timeout fired; the caller still has time left
        self.policy.per_retry_timeout.is_some()
            && matches!(status.code(), Code::DeadlineExceeded | Code::Cancelled)
            && attempt_ctx.is_done()
    }
}

#[async_trait]
impl<Req: Message, Resp: Message> UnaryInterceptor<Req, Resp> for RetryInterceptor {
    async fn intercept(
        &self,
        method: MethodName,
        ctx: &CallContext,
        request: Req,
        next: Next<'_, Req, Resp>,
    ) -> Result<Resp, Status> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let attempt_ctx = ctx.for_attempt(attempt, self.policy.per_retry_timeout);

            let status = match next.run(method, &attempt_ctx, request.clone()).await {
                Ok(response) => return Ok(response),
                Err(status) => status,
            };

            if ctx.is_done() {
                debug!(%method, attempt, code = ?status.code(), "caller context finished, not retrying");
                return Err(status);
            }
            if attempt >= max_attempts {
                debug!(%method, attempt, code = ?status.code(), "retries exhausted");
                return Err(status);
            }
            if !self.should_retry(&status, &attempt_ctx) {
                return Err(status);
            }

            let delay = self.policy.backoff.delay(attempt);
            debug!(
                %method,
                attempt,
                code = ?status.code(),
                delay_ms = delay.as_millis() as u64,
                "retrying call"
            );
            ctx.run(async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
    }
}
