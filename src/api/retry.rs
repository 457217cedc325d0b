//! Bounded retry with backoff, shared by every outbound call.
//!
//! Call sites pick a [`RetryPolicy`] and either propagate the final error
//! ([`retry`]) or substitute a default value ([`retry_or_else`]). A
//! non-retryable error such as an exhausted rate limit is returned on the
//! first occurrence and is never replaced by the fallback.

use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same pause after every failed attempt
    Fixed(Duration),
    /// `offset + base * 2^attempt` after the zero-based failed attempt
    Exponential { base: Duration, offset: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub const fn exponential(attempts: u32, base: Duration, offset: Duration) -> Self {
        Self {
            attempts,
            backoff: Backoff::Exponential { base, offset },
        }
    }

    /// No pause between attempts
    pub const fn immediate(attempts: u32) -> Self {
        Self::fixed(attempts, Duration::ZERO)
    }

    /// Symbol list downloads: 3 tries, 2s apart
    pub const fn importer() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }

    /// Finnhub: 3 tries, waiting 1 + 2^n seconds
    pub const fn finnhub() -> Self {
        Self::exponential(3, Duration::from_secs(1), Duration::from_secs(1))
    }

    /// LLM and news: 3 tries, waiting 2^n seconds
    pub const fn llm() -> Self {
        Self::exponential(3, Duration::from_secs(1), Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, offset } => {
                offset + base.saturating_mul(2u32.saturating_pow(attempt))
            }
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are spent.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!("[{}/{}] {} failed: {}", attempt + 1, attempts, label, e);
                last_error = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| PipelineError::EmptyResult(label.to_string())))
}

/// Like [`retry`], but a final retryable failure yields `fallback()` instead.
pub async fn retry_or_else<T, F, Fut, D>(
    policy: &RetryPolicy,
    label: &str,
    op: F,
    fallback: D,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
    D: FnOnce() -> T,
{
    match retry(policy, label, op).await {
        Ok(value) => Ok(value),
        Err(e) if !e.is_retryable() => Err(e),
        Err(e) => {
            error!("❌ {} gave up after {} attempts: {}", label, policy.attempts.max(1), e);
            Ok(fallback())
        }
    }
}
