//! Bounded Retry with Backoff
//!
//! An eventually-consistent lookup: something else (a webhook, a worker)
//! will create the record at an unknown time, and nobody tells us when.
//! We ask, wait `base * growth^(attempt - 1)`, and ask again until the
//! attempt budget runs out.
//!
//! ```text
//! attempt:   1     2       3           4                   5
//!            |--1s-|---2s--|-----4s----|--------8s---------|
//!            lookup lookup  lookup      lookup              lookup -> NotFound
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Retry budget and backoff curve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total lookups, including the first
    pub max_attempts: u32,

    /// Wait after the first failed lookup
    #[serde(with = "millis")]
    pub base_delay: Duration,

    /// Multiplier applied per further attempt
    pub growth_factor: f64,

    /// Upper bound for any single wait
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            growth_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, growth_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            growth_factor,
            ..Default::default()
        }
    }

    /// Read overrides from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = std::env::var("CHECKOUT_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let base_delay = std::env::var("CHECKOUT_POLL_BASE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.base_delay, Duration::from_millis);
        let growth_factor = std::env::var("CHECKOUT_POLL_GROWTH_FACTOR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.growth_factor);

        Self {
            max_attempts,
            base_delay,
            growth_factor,
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CheckoutError::Config("max_attempts must be at least 1".into()));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(CheckoutError::Config(format!(
                "growth_factor must be >= 1.0, got {}",
                self.growth_factor
            )));
        }
        Ok(())
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.growth_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Sum of all waits when every attempt misses
    pub fn total_wait(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_after(a)).sum()
    }
}

/// Progress notification emitted before each wait
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollProgress {
    /// Attempt that just missed (1-based)
    pub attempt: u32,
    /// Attempts still to come
    pub remaining: u32,
    /// Wait before the next attempt
    pub delay: Duration,
}

/// Terminal result of a bounded lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// Lookup returned a value on attempt `attempts`
    Found { value: T, attempts: u32 },
    /// Every attempt missed
    NotFound {
        attempts: u32,
        /// Last lookup error, if the final misses were errors rather than absences
        last_error: Option<String>,
    },
}

impl<T> PollOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Found { attempts, .. } | PollOutcome::NotFound { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_found(self) -> Option<T> {
        match self {
            PollOutcome::Found { value, .. } => Some(value),
            PollOutcome::NotFound { .. } => None,
        }
    }
}

/// Run `lookup` until it yields a value or the policy's attempts are spent.
///
/// Attempts run strictly one after another. A lookup error counts as a miss.
/// `on_wait` is advisory; it is called before every wait, never after the last attempt.
pub async fn poll_until_found<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut lookup: F,
    mut on_wait: P,
) -> PollOutcome<T>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<Option<T>, E>>,
    P: FnMut(&PollProgress),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match lookup(attempt).await {
            Ok(Some(value)) => {
                tracing::debug!(attempt, "Lookup succeeded");
                return PollOutcome::Found {
                    value,
                    attempts: attempt,
                };
            }
            Ok(None) => {
                last_error = None;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Lookup failed, counting as a miss");
                last_error = Some(e.to_string());
            }
        }

        if attempt == max_attempts {
            break;
        }

        let progress = PollProgress {
            attempt,
            remaining: max_attempts - attempt,
            delay: policy.delay_after(attempt),
        };
        tracing::debug!(
            attempt,
            remaining = progress.remaining,
            delay_ms = u64::try_from(progress.delay.as_millis()).unwrap_or(u64::MAX),
            "Not found yet, backing off"
        );
        on_wait(&progress);
        tokio::time::sleep(progress.delay).await;
    }

    PollOutcome::NotFound {
        attempts: max_attempts,
        last_error,
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
