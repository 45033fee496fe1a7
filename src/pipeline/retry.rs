//! Bounded retry with exponential backoff around a [`Transform`].
//!
//! Translation endpoints fail transiently all the time (HTTP 429/503,
//! dropped connections). [`RetryingTransform`] makes up to
//! `max_attempts` independent calls, sleeping `base * 2^(n-1)` (capped at
//! `max_delay`) before the n-th retry. With the defaults (3 attempts,
//! 1 s base) the waits are 1 s then 2 s.
//!
//! Intermediate failures are only logged. After the last attempt the caller
//! gets [`TransformError::Exhausted`] carrying the final cause. The wrapper
//! never consults the result cache; that layering is the executor's job.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::error::TransformError;
use crate::transform::Transform;

/// Attempt count and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first one. At least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_backoff(),
            max_delay: config.max_backoff(),
        }
    }

    /// Delay before retry number `retry` (1 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// A [`Transform`] that retries its inner transform according to a [`RetryPolicy`].
pub struct RetryingTransform {
    inner: Arc<dyn Transform>,
    policy: RetryPolicy,
}

impl RetryingTransform {
    pub fn new(inner: Arc<dyn Transform>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl Transform for RetryingTransform {
    async fn apply(&self, text: &str) -> Result<String, TransformError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_err: Option<TransformError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.policy.delay_for(attempt);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    self.inner.name(),
                    attempt,
                    attempts - 1,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            match self.inner.apply(text).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    warn!("{}: attempt {} failed: {}", self.inner.name(), attempt + 1, e);
                    last_err = Some(e);
                }
            }
        }

        Err(TransformError::Exhausted {
            attempts,
            last: Box::new(last_err.unwrap_or_else(|| TransformError::failed("unknown error"))),
        })
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
