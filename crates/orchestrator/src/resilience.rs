//! API Resilience Layer.
//!
//! Every remote call goes through [`ResilientExecutor::execute`], which owns
//! retrying, back-off, rate-limit waits, per-attempt timeouts, and the final
//! classification of failures. Adapters implementing
//! [`pipeline::ClassroomApi`] make exactly one attempt per call.
//!
//! ## Retry schedule
//!
//! | Failure | Behaviour |
//! |---------|-----------|
//! | `RateLimited` with reset time | every worker waits until the reset, capped at the ceiling |
//! | `RateLimited` without reset, `TransientNetwork` | exponential back-off with jitter |
//! | `NotFound` | retried only when the call opted in |
//! | `AuthFailure` | never retried; raises the run abort flag |
//! | `ValidationError`, `PermanentApi` | never retried |
//!
//! A retryable failure that is still failing after `max_attempts` attempts
//! surfaces as `PermanentApi`, with the last classification preserved.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeline::{ApiError, ClassifiedError, ErrorKind, RetryPolicy, Timestamp};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::abort::{AbortReason, AbortSignal};

/// Retry and timeout limits shared by every call of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts per call, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for a single back-off delay, before jitter.
    pub max_backoff: Duration,
    /// Jitter as a fraction of the delay (`0.2` means ±20 %).
    pub jitter: f64,
    /// Longest wait for a rate-limit reset.
    pub rate_limit_ceiling: Duration,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_backoff: Duration::from_secs(60),
            jitter: 0.2,
            rate_limit_ceiling: Duration::from_secs(15 * 60),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Back-off before the attempt following failed attempt number `attempt`
/// (1-based): `base * 2^(attempt - 1)`, capped at `max_backoff`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << exponent;
    config
        .base_delay
        .checked_mul(factor)
        .unwrap_or(config.max_backoff)
        .min(config.max_backoff)
}

/// Scales `delay` by a random factor in `[1 - fraction, 1 + fraction]`.
pub fn apply_jitter<R: Rng + ?Sized>(delay: Duration, fraction: f64, rng: &mut R) -> Duration {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction == 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = rng.gen_range((1.0 - fraction)..=(1.0 + fraction));
    delay.mul_f64(factor)
}

/// Time to wait for a rate-limit reset, never longer than `ceiling`.
///
/// A reset in the past yields zero.
pub fn rate_limit_sleep(reset_at: Timestamp, now: Timestamp, ceiling: Duration) -> Duration {
    reset_at.duration_since(now).min(ceiling)
}

// ---------------------------------------------------------------------------

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides [`RetryConfig::max_attempts`] for this call.
    pub max_attempts: Option<u32>,
    /// Treat `NotFound` as transient (for resources GitHub creates
    /// asynchronously).
    pub not_found_retryable: bool,
    /// What the call acts on, for logs and surfaced errors.
    pub target: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: impl ToString) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn not_found_retryable(mut self) -> Self {
        self.not_found_retryable = true;
        self
    }
}

/// One attempt of a call, as logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallAttempt {
    pub operation: String,
    /// 1-based.
    pub attempt: u32,
    /// Wait before the next attempt; zero when none follows.
    pub delay: Duration,
    /// `None` when the attempt succeeded.
    pub classification: Option<ErrorKind>,
}

/// A call that failed at least once and then succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveredCall {
    pub operation: String,
    pub target: Option<String>,
    pub attempts: u32,
    /// Classification of each failed attempt, in order.
    pub failures: Vec<ErrorKind>,
}

/// Position in a [`CallLedger`], used to attribute calls to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerMark {
    attempts: u64,
    recovered: usize,
}

/// Counts attempts and remembers recovered calls for the run report.
#[derive(Debug, Default)]
pub struct CallLedger {
    attempts: AtomicU64,
    recovered: Mutex<Vec<RecoveredCall>>,
}

impl CallLedger {
    fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_recovered(&self, call: RecoveredCall) {
        if let Ok(mut recovered) = self.recovered.lock() {
            recovered.push(call);
        }
    }

    pub fn total_attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn mark(&self) -> LedgerMark {
        LedgerMark {
            attempts: self.total_attempts(),
            recovered: self.recovered.lock().map(|r| r.len()).unwrap_or(0),
        }
    }

    /// Attempts made and calls recovered since `mark`.
    pub fn since(&self, mark: LedgerMark) -> (u64, Vec<RecoveredCall>) {
        let attempts = self.total_attempts().saturating_sub(mark.attempts);
        let recovered = self
            .recovered
            .lock()
            .map(|r| r.iter().skip(mark.recovered).cloned().collect())
            .unwrap_or_default();
        (attempts, recovered)
    }
}

// ---------------------------------------------------------------------------

/// Shared pause point that makes every worker honour a rate-limit reset.
#[derive(Debug, Default)]
pub struct RateLimitGate {
    blocked_until: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the gate is open. Re-checks after waking, so a deadline
    /// extended meanwhile is honoured too.
    pub async fn wait(&self) {
        loop {
            let until = *self.blocked_until.lock().await;
            match until {
                Some(deadline) if deadline > Instant::now() => {
                    tokio::time::sleep_until(deadline).await;
                }
                _ => return,
            }
        }
    }

    /// Closes the gate for `duration`. Never shortens an existing block.
    pub async fn block_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut guard = self.blocked_until.lock().await;
        if guard.map_or(true, |current| current < deadline) {
            *guard = Some(deadline);
        }
    }

    pub async fn blocked_until(&self) -> Option<Instant> {
        *self.blocked_until.lock().await
    }
}

/// Runs remote calls with retries, back-off, timeouts, and rate-limit
/// coordination.
#[derive(Debug)]
pub struct ResilientExecutor {
    config: RetryConfig,
    gate: Arc<RateLimitGate>,
    abort: AbortSignal,
    ledger: CallLedger,
}

impl ResilientExecutor {
    pub fn new(config: RetryConfig, abort: AbortSignal) -> Self {
        Self {
            config,
            gate: Arc::new(RateLimitGate::new()),
            abort,
            ledger: CallLedger::default(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    pub fn abort(&self) -> &AbortSignal {
        &self.abort
    }

    pub fn ledger(&self) -> &CallLedger {
        &self.ledger
    }

    /// Runs `call` until it succeeds, fails permanently, or runs out of
    /// attempts.
    ///
    /// # Errors
    ///
    /// Returns a [`ClassifiedError`] naming `operation`, the final
    /// classification, and the number of attempts made. When the run was
    /// aborted before an attempt, the error reports zero or more attempts and
    /// a "not attempted" message.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        options: CallOptions,
        mut call: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = options
            .max_attempts
            .unwrap_or(self.config.max_attempts)
            .max(1);
        let target = options.target.clone();
        let mut failures: Vec<ErrorKind> = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            if self.abort.is_raised() {
                let reason = self
                    .abort
                    .reason()
                    .map_or_else(|| "run aborted".to_string(), |r| r.to_string());
                return Err(ClassifiedError::cancelled(operation, target, &reason));
            }

            self.gate.wait().await;
            attempt += 1;
            self.ledger.record_attempt();

            let outcome = match tokio::time::timeout(self.config.attempt_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::transient(format!(
                    "attempt timed out after {}s",
                    self.config.attempt_timeout.as_secs_f64()
                ))),
            };

            let error = match outcome {
                Ok(value) => {
                    log_attempt(&ApiCallAttempt {
                        operation: operation.to_string(),
                        attempt,
                        delay: Duration::ZERO,
                        classification: None,
                    });
                    if attempt > 1 {
                        tracing::info!(
                            operation,
                            target = target.as_deref().unwrap_or(""),
                            attempts = attempt,
                            "Call recovered after retrying"
                        );
                        self.ledger.record_recovered(RecoveredCall {
                            operation: operation.to_string(),
                            target: target.clone(),
                            attempts: attempt,
                            failures,
                        });
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };
            failures.push(error.kind);

            if error.kind.is_fatal() {
                log_attempt(&ApiCallAttempt {
                    operation: operation.to_string(),
                    attempt,
                    delay: Duration::ZERO,
                    classification: Some(error.kind),
                });
                self.abort.raise(AbortReason::AuthFailure {
                    operation: operation.to_string(),
                    message: error.message.clone(),
                });
                return Err(ClassifiedError::from_attempt(operation, target, error, attempt));
            }

            let now = Timestamp::now();
            let after = match error.retry_policy(options.not_found_retryable, now) {
                RetryPolicy::NonRetryable => {
                    log_attempt(&ApiCallAttempt {
                        operation: operation.to_string(),
                        attempt,
                        delay: Duration::ZERO,
                        classification: Some(error.kind),
                    });
                    return Err(ClassifiedError::from_attempt(operation, target, error, attempt));
                }
                RetryPolicy::Retryable { after } => after,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    operation,
                    target = target.as_deref().unwrap_or(""),
                    attempts = attempt,
                    last_kind = %error.kind,
                    "Retries exhausted"
                );
                return Err(ClassifiedError::exhausted(operation, target, error, attempt));
            }

            let delay = match (after, error.rate_limit_reset()) {
                (Some(_), Some(reset)) => {
                    rate_limit_sleep(reset, now, self.config.rate_limit_ceiling)
                }
                _ => apply_jitter(
                    backoff_delay(&self.config, attempt),
                    self.config.jitter,
                    &mut rand::thread_rng(),
                ),
            };

            log_attempt(&ApiCallAttempt {
                operation: operation.to_string(),
                attempt,
                delay,
                classification: Some(error.kind),
            });

            if error.kind == ErrorKind::RateLimited {
                // Every worker pauses, not just this one.
                self.gate.block_for(delay).await;
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn log_attempt(attempt: &ApiCallAttempt) {
    match attempt.classification {
        None => tracing::debug!(
            operation = %attempt.operation,
            attempt = attempt.attempt,
            "Call succeeded"
        ),
        Some(kind) => tracing::debug!(
            operation = %attempt.operation,
            attempt = attempt.attempt,
            classification = %kind,
            delay_ms = attempt.delay.as_millis() as u64,
            "Call attempt failed"
        ),
    }
}
