//! # Bounded retry loop for action attempts.
//!
//! Every action (notify/command/webhook) runs through the same state machine:
//!
//! ```text
//!   idle ──dispatch──▶ delaying ──▶ sending ──(ok)──▶ done-ok
//!                                       │
//!                                       └──(err, tries<max)──▶ backoff ──▶ sending
//!                                       └──(err, tries=max)──▶ done-fail
//! ```
//!
//! Sleeps (initial delay and inter-attempt backoff) are cancellable; a
//! cancelled action reports [`RetryOutcome::Cancelled`] and is neither a
//! success nor a failure.

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

/// Retry parameters of one action.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Wait before the first attempt.
    pub delay: Duration,
    /// Total attempts allowed (≥ 1).
    pub max_tries: u32,
    /// Fixed wait between failed attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Clamps `max_tries` to at least one attempt.
    pub fn max_tries_clamped(&self) -> u32 {
        self.max_tries.max(1)
    }
}

/// Terminal state of a retried action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Succeeded on the given attempt (1-based).
    Success { attempt: u32 },
    /// Every allowed attempt failed; carries the final error.
    Exhausted { attempts: u32, last_error: String },
    /// Cancelled before completion (shutdown).
    Cancelled,
}

impl RetryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }
}

/// Drives `attempt` through the retry state machine.
///
/// `label` identifies the action in attempt logs; one warn line is written
/// per failed attempt, so `max_tries = N` against a dead endpoint yields
/// exactly `N` attempt log lines.
pub async fn run_with_retries<F, Fut>(
    policy: RetryPolicy,
    label: &str,
    token: &CancellationToken,
    mut attempt: F,
) -> RetryOutcome
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    if policy.delay > Duration::ZERO && !sleep_cancellable(policy.delay, token).await {
        return RetryOutcome::Cancelled;
    }

    let max = policy.max_tries_clamped();
    let mut last_error = String::new();
    for n in 1..=max {
        if token.is_cancelled() {
            return RetryOutcome::Cancelled;
        }
        match attempt(n).await {
            Ok(()) => return RetryOutcome::Success { attempt: n },
            Err(e) => {
                warn!("{label}: attempt {n}/{max} failed: {e}");
                last_error = e;
            }
        }
        if n < max && !sleep_cancellable(policy.backoff, token).await {
            return RetryOutcome::Cancelled;
        }
    }
    RetryOutcome::Exhausted {
        attempts: max,
        last_error,
    }
}

/// Sleeps unless cancelled first; returns false on cancellation.
async fn sleep_cancellable(dur: Duration, token: &CancellationToken) -> bool {
    if dur == Duration::ZERO {
        return !token.is_cancelled();
    }
    let sleep = time::sleep(dur);
    tokio::pin!(sleep);
    select! {
        _ = &mut sleep => true,
        _ = token.cancelled() => false,
    }
}
