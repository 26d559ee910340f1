//! Readiness gating with bounded exponential backoff.

mod exec;
mod http;

pub use exec::ExecCheck;
pub use http::HttpCheck;

use crate::config::ReadinessConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One readiness probe of a service.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// `Err` carries a short description of why the service is not ready yet.
    async fn probe(&self) -> std::result::Result<(), String>;

    /// What is being probed, for logs.
    fn describe(&self) -> String;
}

/// Attempt budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
        }
    }
}

impl From<&ReadinessConfig> for BackoffPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial: config.initial_backoff,
            max: config.max_backoff,
        }
    }
}

impl BackoffPolicy {
    /// Delay slept after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Longest total time spent sleeping before giving up.
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|a| self.delay_after(a))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Where a service is in its startup gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessState {
    #[default]
    NotProbed,
    Probing { attempt: u32, waited: Duration },
    Ready,
}

/// Block until `check` passes, the attempt budget runs out, or `token` fires.
///
/// Cancellation is checked before every probe and interrupts both the probe
/// and the backoff sleep. No sleep follows the final attempt.
pub async fn wait_ready(
    token: &CancellationToken,
    service: &str,
    check: &dyn ReadinessCheck,
    policy: BackoffPolicy,
    state: &mut ReadinessState,
) -> Result<()> {
    let mut waited = Duration::ZERO;
    let mut last_failure = String::from("never probed");

    tracing::info!(
        "Waiting for '{}' to become ready ({})",
        service,
        check.describe()
    );

    for attempt in 1..=policy.max_attempts {
        if token.is_cancelled() {
            return Err(Error::Cancelled(service.to_string()));
        }
        *state = ReadinessState::Probing { attempt, waited };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled(service.to_string())),
            outcome = check.probe() => outcome,
        };

        match outcome {
            Ok(()) => {
                *state = ReadinessState::Ready;
                tracing::info!("'{}' is ready (attempt {})", service, attempt);
                return Ok(());
            }
            Err(reason) => {
                tracing::debug!(
                    "'{}' not ready (attempt {}/{}): {}",
                    service,
                    attempt,
                    policy.max_attempts,
                    reason
                );
                last_failure = reason;
            }
        }

        // Don't sleep after the last attempt
        if attempt < policy.max_attempts {
            let delay = policy.delay_after(attempt);
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(Error::Cancelled(service.to_string())),
                _ = tokio::time::sleep(delay) => {}
            }
            waited = waited.saturating_add(delay);
        }
    }

    Err(Error::ReadinessTimeout {
        service: service.to_string(),
        attempts: policy.max_attempts,
        last_failure,
    })
}
