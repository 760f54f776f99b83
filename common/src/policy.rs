use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackoffPolicy {
    None,
    Linear { base_ms: u64, max_ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

/// Bounded retry for store commands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::Exponential {
                base_ms: 100,
                max_ms: 2_000,
            },
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffPolicy::None,
        }
    }

    /// Delay before retry number `attempt` (1 = first retry).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            BackoffPolicy::None => 0,
            BackoffPolicy::Linear { base_ms, max_ms } => {
                base_ms.saturating_mul(attempt as u64).min(max_ms)
            }
            BackoffPolicy::Exponential { base_ms, max_ms } => {
                let shift = attempt.saturating_sub(1).min(32);
                base_ms.saturating_mul(1u64 << shift).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff: BackoffPolicy::Exponential {
                base_ms: 100,
                max_ms: 1_000,
            },
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(64), Duration::from_millis(1_000));
    }

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: BackoffPolicy::Linear {
                base_ms: 50,
                max_ms: 120,
            },
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(120));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }
}
