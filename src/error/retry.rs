use std::time::Duration;

use crate::error::{AppError, SanitizedError, StoreErrorKind};

/// Message fragments that identify a transient failure when the driver could
/// not classify the error itself. Matched case-insensitively.
pub const TRANSIENT_MARKERS: &[&str] = &[
    "econnrefused",
    "connection refused",
    "enotfound",
    "host not found",
    "etimedout",
    "timed out",
    "econnreset",
    "connection reset",
    "connection terminated unexpectedly",
];

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of physical attempts (including the first one)
    pub max_attempts: u32,
    /// Delay after the first failed attempt (in milliseconds)
    pub base_delay_ms: u64,
    /// Whether to add up to 10% of upward jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000, // 1 second
            use_jitter: false,
        }
    }
}

/// One failed attempt inside a retry loop.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    /// 1-based attempt number
    pub attempt_number: u32,
    pub error: SanitizedError,
    /// Delay before the next attempt, `None` when the loop gives up
    pub delay_ms: Option<u64>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            ..Self::default()
        }
    }

    /// Decide whether an error is worth another attempt.
    ///
    /// Structured driver kinds win; unclassified store errors fall back to
    /// the message markers.
    pub fn is_retriable(&self, error: &AppError) -> bool {
        match error {
            AppError::StoreError { kind, message } => match kind {
                StoreErrorKind::Other => is_transient_message(message),
                kind => kind.is_transient(),
            },
            _ => false,
        }
    }

    /// `base_delay_ms * 2^(attempt - 1)`, saturating at `u64::MAX`.
    pub fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(63);
        self.base_delay_ms.saturating_mul(1u64 << exponent)
    }

    /// Calculate the sleep before the attempt following `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let mut delay_ms = self.backoff_delay_ms(attempt);

        if self.use_jitter && delay_ms > 0 {
            delay_ms += rand::random::<u64>() % (delay_ms / 10 + 1);
        }

        Duration::from_millis(delay_ms)
    }
}

pub fn is_transient_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
        assert!(!policy.use_jitter);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay_ms(1), 1000);
        assert_eq!(policy.backoff_delay_ms(2), 2000);
        assert_eq!(policy.backoff_delay_ms(3), 4000);
        assert_eq!(policy.next_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_keeps_doubling_past_thirty_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay_ms(6), 32000);
        assert_eq!(policy.backoff_delay_ms(7), 64000);
    }

    #[test]
    fn test_large_base_delay_is_never_shortened() {
        let policy = RetryPolicy::new(7, 60000);
        assert_eq!(policy.next_delay(1), Duration::from_millis(60000));
        for attempt in 1..=7u32 {
            assert!(policy.backoff_delay_ms(attempt) >= 60000 * 2u64.pow(attempt - 1));
        }
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(100, u64::MAX / 2);
        assert_eq!(policy.backoff_delay_ms(3), u64::MAX);
        assert_eq!(policy.backoff_delay_ms(90), u64::MAX);
    }

    #[test]
    fn test_attempt_record_is_reexported() {
        let err = AppError::store(StoreErrorKind::ConnectionRefused, "connect ECONNREFUSED");
        let record = crate::error::RetryAttempt {
            attempt_number: 1,
            error: crate::error::sanitize(&err),
            delay_ms: Some(RetryPolicy::default().backoff_delay_ms(1)),
        };
        assert_eq!(record.delay_ms, Some(1000));
        assert!(record.error.to_string().contains("ECONNREFUSED"));
    }

    #[test]
    fn test_jitter_never_shrinks_delay() {
        let policy = RetryPolicy {
            use_jitter: true,
            ..RetryPolicy::new(5, 100)
        };
        for attempt in 1..=4 {
            let base = policy.backoff_delay_ms(attempt);
            let delay = policy.next_delay(attempt).as_millis() as u64;
            assert!(delay >= base);
            assert!(delay <= base + base / 10);
        }
    }

    #[test]
    fn test_marker_messages_are_retriable() {
        let policy = RetryPolicy::default();
        for message in [
            "connect ECONNREFUSED 127.0.0.1:27017",
            "getaddrinfo ENOTFOUND db",
            "Server selection timed out after 30000 ms",
            "read ECONNRESET",
            "Connection terminated unexpectedly",
        ] {
            let err = AppError::store(StoreErrorKind::Other, message);
            assert!(policy.is_retriable(&err), "{message}");
        }
    }

    #[test]
    fn test_fatal_errors_are_not_retriable() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retriable(&AppError::store(
            StoreErrorKind::Authentication,
            "authentication failed, connection refused by policy",
        )));
        assert!(!policy.is_retriable(&AppError::store(
            StoreErrorKind::Other,
            "password authentication failed",
        )));
        assert!(!policy.is_retriable(&AppError::DuplicateKey("projects/p1".to_string())));
        assert!(!policy.is_retriable(&AppError::ConfigError("bad url".to_string())));
    }

    #[test]
    fn test_structured_kind_wins_over_message() {
        let policy = RetryPolicy::default();
        let err = AppError::store(StoreErrorKind::ConnectionReset, "socket closed");
        assert!(policy.is_retriable(&err));
    }
}
