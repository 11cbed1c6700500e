// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Exponential backoff for admin API calls, failed objects and Kubernetes API calls.
//!
//! - [`admin_backoff`]: the short in-call retry of the admin client
//! - [`failure_backoff`]: requeue delay of a failed object, capped at the resync interval
//! - [`default_backoff`]: status patches against the Kubernetes API

use anyhow::Result;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::constants::FAILED_OBJECT_INITIAL_BACKOFF_MILLIS;

/// Tunables of one retry schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// First delay.
    pub initial: Duration,
    /// Ceiling for any single delay.
    pub max: Duration,
    /// Give up once this much time has passed since the first attempt.
    pub deadline: Option<Duration>,
    pub multiplier: f64,
    /// Fraction of the delay added or removed at random (0.1 is ±10%).
    pub jitter: f64,
}

/// Status patches and other Kubernetes API calls: 100ms doubling up to 30s,
/// giving up after 2 minutes.
pub const KUBE_API_POLICY: BackoffPolicy = BackoffPolicy {
    initial: Duration::from_millis(100),
    max: Duration::from_secs(30),
    deadline: Some(Duration::from_secs(120)),
    multiplier: 2.0,
    jitter: 0.1,
};

/// In-call retries of the admin client. Attempts are bounded by the caller.
pub const ADMIN_API_POLICY: BackoffPolicy = BackoffPolicy {
    initial: Duration::from_millis(50),
    max: Duration::from_secs(2),
    deadline: None,
    multiplier: 2.0,
    jitter: 0.1,
};

/// Running state of a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: BackoffPolicy,
    current: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.initial,
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Un-jittered delay the next call will be based on.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Next delay to sleep, or `None` once the deadline has passed.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self
            .policy
            .deadline
            .is_some_and(|deadline| self.started.elapsed() >= deadline)
        {
            return None;
        }

        let delay = self.jittered(self.current);
        self.current = self
            .current
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial;
        self.started = Instant::now();
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.policy.jitter <= 0.0 {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let spread = secs * self.policy.jitter;
        let secs = rand::rng().random_range((secs - spread)..=(secs + spread));
        Duration::from_secs_f64(secs.max(0.0)).min(self.policy.max)
    }
}

#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(KUBE_API_POLICY)
}

#[must_use]
pub fn admin_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(ADMIN_API_POLICY)
}

/// Requeue delay after `failures` consecutive failures of one object.
///
/// 1s, 2s, 4s ... capped at `cap` (the resync interval). No jitter: the
/// delay only orders work within this process.
#[must_use]
pub fn failure_backoff(failures: u32, cap: Duration) -> Duration {
    let initial = Duration::from_millis(FAILED_OBJECT_INITIAL_BACKOFF_MILLIS);
    let exponent = failures.saturating_sub(1).min(30);
    initial.saturating_mul(1 << exponent).min(cap)
}

/// Run a Kubernetes API call under [`KUBE_API_POLICY`].
///
/// Only transient failures (see [`is_retryable_error`]) are retried.
///
/// # Errors
///
/// Returns the error of the last attempt, or a timeout error once the
/// backoff is exhausted.
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let mut attempt: u32 = 1;

    loop {
        let e = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Kubernetes API call recovered");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_retryable_error(&e) {
            error!(operation = operation_name, error = %e, "Kubernetes API call rejected");
            return Err(e.into());
        }
        let Some(delay) = backoff.next_backoff() else {
            error!(
                operation = operation_name,
                attempt,
                error = %e,
                "Kubernetes API retries exhausted"
            );
            return Err(anyhow::anyhow!("{operation_name} failed after {attempt} attempts: {e}"));
        };
        warn!(
            operation = operation_name,
            attempt,
            retry_after = ?delay,
            error = %e,
            "Kubernetes API call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Whether a Kubernetes error is transient (429, 5xx or a transport failure).
pub(crate) fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(status) => status.code == 429 || (500..600).contains(&status.code),
        kube::Error::Service(_) => true,
        _ => false,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
