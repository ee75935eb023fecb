//! Exponential backoff with jitter around a single operation call.
//!
//! Only structured service errors with a known-transient code are retried.
//! Unknown codes are treated like non-retryable ones. Transport faults get a
//! small, separate retry budget.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::OperationFault;
use crate::operation::OutcomeRecord;

const RETRYABLE_CODES: &[&str] = &[
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "InternalError",
    "ServiceUnavailable",
    "RequestTimeout",
];

const NON_RETRYABLE_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "InvalidSecurity",
    "SignatureDoesNotMatch",
    "TokenRefreshRequired",
    "NoSuchBucket",
    "NoSuchKey",
    "InvalidBucketName",
    "BucketAlreadyExists",
    "BucketAlreadyOwnedByYou",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    NonRetryable,
    Unclassified,
}

pub fn classify(error_code: &str) -> ErrorClass {
    if RETRYABLE_CODES.contains(&error_code) {
        ErrorClass::Retryable
    } else if NON_RETRYABLE_CODES.contains(&error_code) {
        ErrorClass::NonRetryable
    } else {
        ErrorClass::Unclassified
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the initial call included.
    pub max_attempts: u32,
    #[serde(with = "crate::model::duration_ms")]
    pub base_delay: Duration,
    #[serde(with = "crate::model::duration_ms")]
    pub max_delay: Duration,
    pub exponential_factor: f64,
    pub jitter: bool,
    /// Extra attempts granted to transport/system faults.
    pub transport_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_factor: 2.0,
            jitter: true,
            transport_retries: 2,
        }
    }
}

/// Abstracts waiting so tests can observe backoff without sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay before retry number `retry` (0-based): `min(base * factor^retry, cap)`,
    /// scaled into `[0.5, 1.0)` of that value when jitter is on.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let cap = self.config.max_delay;
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs =
            self.config.base_delay.as_secs_f64() * self.config.exponential_factor.powi(exponent);
        let mut delay = if !secs.is_finite() || secs >= cap.as_secs_f64() {
            cap
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        };
        if self.config.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5_f64..1.0_f64);
            delay = delay.mul_f64(factor);
        }
        delay
    }

    /// Runs `call` until it produces a non-retryable outcome or the budget is spent.
    /// The last outcome (or fault) is returned as-is.
    pub async fn run<F, Fut>(&self, operation: &str, mut call: F) -> Result<OutcomeRecord, OperationFault>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<OutcomeRecord, OperationFault>> + Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 0;
        let mut transport_failures: u32 = 0;

        loop {
            attempt += 1;
            match call().await {
                Ok(outcome) => {
                    let Some(code) = outcome.error_code.clone().filter(|_| !outcome.success)
                    else {
                        return Ok(outcome);
                    };
                    let code = code.as_str();
                    let class = classify(code);
                    if class != ErrorClass::Retryable {
                        debug!(operation, error_code = code, class = ?class, "not retrying");
                        return Ok(outcome);
                    }
                    if attempt >= max_attempts {
                        warn!(
                            operation,
                            error_code = code,
                            attempts = attempt,
                            "retry budget exhausted"
                        );
                        return Ok(outcome);
                    }
                    let backoff = self.backoff_delay(attempt - 1);
                    warn!(
                        operation,
                        error_code = code,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying operation"
                    );
                    self.sleeper.sleep(backoff).await;
                }
                Err(fault) => {
                    if transport_failures >= self.config.transport_retries {
                        return Err(fault);
                    }
                    let backoff = self.backoff_delay(transport_failures);
                    transport_failures += 1;
                    warn!(
                        operation,
                        error = %fault,
                        retry = transport_failures,
                        max_retries = self.config.transport_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying operation after fault"
                    );
                    self.sleeper.sleep(backoff).await;
                }
            }
        }
    }
}
