use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::InitError;

/// Per-endpoint retry limits, carried by the effective configuration once
/// known and seeded from compiled-in defaults before that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub scaling_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 500,
            scaling_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Pure retry decision function: given how many attempts have already
/// failed and the error that ended the latest one, decide whether another
/// attempt is warranted and how long to back off first.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// `failed_attempts` counts requests already issued and failed; the
    /// total request count on exhaustion is `max_retries + 1`.
    pub fn decide(&self, failed_attempts: u32, error: &InitError) -> RetryDecision {
        if !error.is_retryable() || failed_attempts > self.config.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.backoff(failed_attempts))
    }

    fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let scaled =
            self.config.base_delay_ms as f64 * self.config.scaling_factor.powi(exponent as i32);
        Duration::from_millis(scaled as u64)
    }
}

/// Outcome of one logical fetch stage: the terminal result plus how many
/// requests it took to get there. The attempt count is observable for
/// diagnostics either way.
#[derive(Debug, Clone)]
pub struct FetchOutcome<T> {
    pub result: Result<T, InitError>,
    pub attempts: u32,
}

/// Drive an idempotent async operation under a [`RetryPolicy`]. Backoff
/// delays are cancellation points: once the attempt is being abandoned the
/// last error is surfaced immediately instead of sleeping.
pub async fn with_retry<T, Op, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: Op,
) -> FetchOutcome<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InitError>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let error = match op().await {
            Ok(value) => {
                return FetchOutcome {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(error) => error,
        };
        match policy.decide(attempts, &error) {
            RetryDecision::GiveUp => {
                return FetchOutcome {
                    result: Err(error),
                    attempts,
                };
            }
            RetryDecision::RetryAfter(delay) => {
                tokio::select! {
                    () = cancel.cancelled() => {
                        return FetchOutcome {
                            result: Err(error),
                            attempts,
                        };
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
