//! Error classification and retry policy for endpoint calls.
//!
//! Classification order matters and is fixed: aborted, then HTTP status
//! bands, then message-pattern matches, else unknown.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    Network,
    Http4xx,
    Http5xx,
    Aborted,
    Unknown,
}

impl ErrorCategory {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout | ErrorCategory::Network | ErrorCategory::Http5xx
        )
    }
}

static TIMEOUT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)timeout|ETIMEDOUT|AbortError").unwrap());
static NETWORK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ENOTFOUND|ECONNRESET|ECONNREFUSED|EHOSTUNREACH|network").unwrap()
});

/// Raw signal an endpoint call produced, fed to `classify`.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub aborted: bool,
    pub http_status: Option<u16>,
    pub message: Option<String>,
}

/// Deterministic: identical inputs always yield the same category.
pub fn classify(outcome: &CallOutcome) -> ErrorCategory {
    if outcome.aborted {
        return ErrorCategory::Aborted;
    }
    if let Some(status) = outcome.http_status {
        if status >= 500 {
            return ErrorCategory::Http5xx;
        }
        if (400..500).contains(&status) {
            return ErrorCategory::Http4xx;
        }
    }
    if let Some(message) = &outcome.message {
        if TIMEOUT_PATTERN.is_match(message) {
            return ErrorCategory::Timeout;
        }
        if NETWORK_PATTERN.is_match(message) {
            return ErrorCategory::Network;
        }
    }
    ErrorCategory::Unknown
}

/// Decides whether a failed attempt should be retried, and the delay
/// before the next attempt. Stateless per (attempt, category).
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, attempt: u32, max_attempts: u32, category: ErrorCategory) -> bool {
        attempt < max_attempts && category.is_transient()
    }

    fn backoff(&self, attempt: u32) -> Duration;
}

/// Default retry policy: linear `250ms * attempt`.
#[derive(Debug, Clone, Default)]
pub struct LinearBackoff;

impl RetryPolicy for LinearBackoff {
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(250 * attempt as u64)
    }
}

/// Exponential backoff with jitter, seeded so delays are reproducible
/// given the same seed — a drop-in alternative to `LinearBackoff` for
/// endpoints that need longer cooldowns between attempts.
pub struct ExponentialJitterBackoff {
    base: Duration,
    max: Duration,
    rng: parking_lot::Mutex<rand::rngs::SmallRng>,
}

impl ExponentialJitterBackoff {
    pub fn new(base: Duration, max: Duration, seed: u64) -> Self {
        use rand::SeedableRng;
        Self {
            base,
            max,
            rng: parking_lot::Mutex::new(rand::rngs::SmallRng::seed_from_u64(seed)),
        }
    }
}

impl RetryPolicy for ExponentialJitterBackoff {
    fn backoff(&self, attempt: u32) -> Duration {
        use rand::Rng;
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max);
        let jitter_ms = self.rng.lock().gen_range(0..=capped.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(aborted: bool, status: Option<u16>, message: Option<&str>) -> CallOutcome {
        CallOutcome {
            aborted,
            http_status: status,
            message: message.map(|s| s.to_string()),
        }
    }

    #[test]
    fn aborted_takes_precedence() {
        assert_eq!(
            classify(&outcome(true, Some(500), Some("timeout"))),
            ErrorCategory::Aborted
        );
    }

    #[test]
    fn http_5xx_is_transient() {
        let cat = classify(&outcome(false, Some(503), None));
        assert_eq!(cat, ErrorCategory::Http5xx);
        assert!(cat.is_transient());
    }

    #[test]
    fn http_4xx_is_not_transient() {
        let cat = classify(&outcome(false, Some(404), None));
        assert_eq!(cat, ErrorCategory::Http4xx);
        assert!(!cat.is_transient());
    }

    #[test]
    fn message_pattern_timeout() {
        assert_eq!(
            classify(&outcome(false, None, Some("request ETIMEDOUT after 30s"))),
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn message_pattern_network() {
        assert_eq!(
            classify(&outcome(false, None, Some("ECONNREFUSED by peer"))),
            ErrorCategory::Network
        );
    }

    #[test]
    fn unmatched_is_unknown_and_non_transient() {
        let cat = classify(&outcome(false, None, Some("something weird")));
        assert_eq!(cat, ErrorCategory::Unknown);
        assert!(!cat.is_transient());
    }

    #[test]
    fn classification_is_deterministic() {
        let o = outcome(false, Some(503), Some("ignored"));
        assert_eq!(classify(&o), classify(&o));
    }

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let policy = LinearBackoff;
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(3), Duration::from_millis(750));
    }

    #[test]
    fn retry_policy_stops_at_max_attempts() {
        let policy = LinearBackoff;
        assert!(!policy.should_retry(2, 2, ErrorCategory::Http5xx));
        assert!(policy.should_retry(1, 2, ErrorCategory::Http5xx));
        assert!(!policy.should_retry(1, 2, ErrorCategory::Http4xx));
    }

    #[test]
    fn exponential_jitter_is_deterministic_given_seed() {
        let a = ExponentialJitterBackoff::new(Duration::from_millis(100), Duration::from_secs(5), 42);
        let b = ExponentialJitterBackoff::new(Duration::from_millis(100), Duration::from_secs(5), 42);
        assert_eq!(a.backoff(2), b.backoff(2));
    }
}
