//! Retry-Poller
//!
//! The single retry primitive. Every query, assertion and actionability check
//! re-evaluates its predicate through [`Poller::poll`] until it is satisfied,
//! the budget runs out, or the run is cancelled.
//!
//! ## Toyota Way Application:
//! - **Heijunka**: One polling cadence for every wait keeps test timing predictable
//! - **Jidoka**: Non-retryable errors stop the poll on the first attempt

use crate::result::{VigilError, VigilResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Default budget for a poll, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 4000;

/// Default pause between attempts, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Result of one predicate evaluation, and the terminal state of a poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Not yet; carries a description of what was observed
    Pending(String),
    /// Condition holds
    Satisfied(T),
    /// Gave up; carries the last observed state
    TimedOut(String),
}

impl<T> PollOutcome<T> {
    /// Check if the outcome is satisfied
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied(_))
    }
}

/// Growth of the pause between attempts
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Constant interval
    #[default]
    Fixed,
    /// Multiply the interval after every attempt, up to a ceiling
    Exponential {
        /// Multiplier, at least 1.0
        factor: f64,
        /// Ceiling in milliseconds
        max_interval_ms: u64,
    },
}

impl Backoff {
    /// Interval to use after `current`
    #[must_use]
    pub fn next(self, current: Duration) -> Duration {
        match self {
            Self::Fixed => current,
            Self::Exponential {
                factor,
                max_interval_ms,
            } => {
                // Grow in f64 so a huge factor saturates at the ceiling
                // instead of overflowing Duration.
                let ceiling = Duration::from_millis(max_interval_ms).max(current);
                let grown = current.as_secs_f64() * factor.max(1.0);
                Duration::try_from_secs_f64(grown).map_or(ceiling, |grown| grown.min(ceiling))
            }
        }
    }
}

/// Poll budget and cadence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Total budget in milliseconds
    pub timeout_ms: u64,
    /// Pause between attempts in milliseconds
    pub interval_ms: u64,
    /// Interval growth
    #[serde(default)]
    pub backoff: Backoff,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: Backoff::Fixed,
        }
    }
}

impl PollConfig {
    /// Create a config with the given budget and the default interval
    #[must_use]
    pub const fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            backoff: Backoff::Fixed,
        }
    }

    /// Set the interval
    #[must_use]
    pub const fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the backoff policy
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Budget as a duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval as a duration
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Shared cancellation flag.
///
/// Cloning shares the flag. Sleeping through [`CancelToken::sleep`] parks the
/// thread and wakes at once when the token is cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl CancelToken {
    /// Create an uncancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every holder of this token
    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.wake.notify_all();
    }

    /// Whether [`CancelToken::cancel`] has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Park for up to `duration`. Returns `true` if woken by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .wake
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
        true
    }
}

/// Terminal state of a poll with attempt statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    /// `Satisfied` or `TimedOut`
    pub outcome: PollOutcome<T>,
    /// Predicate evaluations
    pub attempts: u32,
    /// Wall-clock time spent
    pub elapsed: Duration,
}

impl<T> Polled<T> {
    /// Convert into a value, mapping a timeout to [`VigilError::TimedOut`].
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::TimedOut`] if the poll gave up.
    pub fn into_result(self, what: &str, timeout_ms: u64) -> VigilResult<T> {
        match self.outcome {
            PollOutcome::Satisfied(value) => Ok(value),
            PollOutcome::Pending(last_observed) | PollOutcome::TimedOut(last_observed) => {
                Err(VigilError::TimedOut {
                    what: what.to_string(),
                    timeout_ms,
                    attempts: self.attempts,
                    last_observed,
                })
            }
        }
    }
}

/// Runs predicates until satisfied, timed out or cancelled
#[derive(Debug, Clone, Default)]
pub struct Poller {
    config: PollConfig,
    cancel: CancelToken,
}

impl Poller {
    /// Create a poller sharing the given cancellation token
    #[must_use]
    pub const fn new(config: PollConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Budget and cadence
    #[must_use]
    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Cancellation token
    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Same token, different budget
    #[must_use]
    pub fn with_config(&self, config: PollConfig) -> Self {
        Self {
            config,
            cancel: self.cancel.clone(),
        }
    }

    /// Evaluate `predicate` until it is satisfied or the budget is spent.
    ///
    /// The predicate returns [`PollOutcome::Pending`] to ask for another
    /// attempt, [`PollOutcome::Satisfied`] to finish, or
    /// [`PollOutcome::TimedOut`] to give up early. Retryable errors count as
    /// pending observations; any other error ends the poll immediately.
    ///
    /// A predicate that never holds gives up once the elapsed time reaches the
    /// timeout; the last pause is clipped to the remaining budget.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Cancelled`] if the token is cancelled, or the
    /// first non-retryable error from the predicate.
    pub fn poll<T, F>(&self, what: &str, mut predicate: F) -> VigilResult<Polled<T>>
    where
        F: FnMut() -> VigilResult<PollOutcome<T>>,
    {
        let start = Instant::now();
        let timeout = self.config.timeout();
        let mut interval = self.config.interval();
        let mut attempts = 0u32;
        let mut last_observed = String::from("no observation");

        loop {
            if self.cancel.is_cancelled() {
                return Err(VigilError::Cancelled {
                    what: what.to_string(),
                });
            }

            attempts += 1;
            match predicate() {
                Ok(PollOutcome::Satisfied(value)) => {
                    tracing::trace!(what, attempts, "poll satisfied");
                    return Ok(Polled {
                        outcome: PollOutcome::Satisfied(value),
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Ok(PollOutcome::TimedOut(observed)) => {
                    return Ok(Polled {
                        outcome: PollOutcome::TimedOut(observed),
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Ok(PollOutcome::Pending(observed)) => last_observed = observed,
                Err(err) if err.is_retryable() => last_observed = err.to_string(),
                Err(err) => return Err(err),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::debug!(what, attempts, last = %last_observed, "poll timed out");
                return Ok(Polled {
                    outcome: PollOutcome::TimedOut(last_observed),
                    attempts,
                    elapsed,
                });
            }

            let pause = interval.min(timeout - elapsed);
            if self.cancel.sleep(pause) {
                return Err(VigilError::Cancelled {
                    what: what.to_string(),
                });
            }
            interval = self.config.backoff.next(interval);
        }
    }
}

/// Poll `predicate` with the given budget and no cancellation.
///
/// # Errors
///
/// Returns [`VigilError::TimedOut`] with the last observation when the budget
/// runs out, or the first non-retryable predicate error.
pub fn poll<T, F>(predicate: F, timeout_ms: u64, interval_ms: u64) -> VigilResult<T>
where
    F: FnMut() -> VigilResult<PollOutcome<T>>,
{
    let config = PollConfig::new(timeout_ms).with_interval_ms(interval_ms);
    Poller::new(config, CancelToken::new())
        .poll("condition", predicate)?
        .into_result("condition", timeout_ms)
}
