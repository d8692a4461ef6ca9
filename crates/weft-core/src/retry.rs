//! Fixed-interval retry policy shared by the router's fallback loop and the
//! offline queue's sync loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A bounded, fixed-interval retry policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(with = "crate::config::humantime_secs")]
    pub interval: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Whether the given attempt count has used up the budget
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Attempts remaining after `attempts` have been made
    pub fn remaining(&self, attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert!(!policy.exhausted(0));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn test_remaining() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.remaining(0), 3);
        assert_eq!(policy.remaining(3), 0);
        assert_eq!(policy.remaining(10), 0);
    }
}
