//! Bounded, fixed-delay reconnect policy

use std::time::Duration;

/// How often and how soon to retry after an unexpected close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed before giving up
    pub max_attempts: u32,
    /// Delay before every attempt (constant, no backoff)
    pub delay: Duration,
}

/// What to do after a connection was lost or could not be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make attempt number `attempt`
    Retry { attempt: u32, delay: Duration },
    /// The budget is spent; stop retrying
    Exhausted { attempts: u32 },
}

/// Attempt counter; reset whenever a connection opens
#[derive(Debug, Default)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consume one attempt from the budget, if any is left
    pub fn next(&mut self, policy: &ReconnectPolicy) -> ReconnectDecision {
        if self.attempts >= policy.max_attempts {
            return ReconnectDecision::Exhausted {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: policy.delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
        }
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = policy();
        let mut state = ReconnectState::default();

        for expected in 1..=5 {
            assert_eq!(
                state.next(&policy),
                ReconnectDecision::Retry {
                    attempt: expected,
                    delay: Duration::from_millis(3000),
                }
            );
        }

        assert_eq!(state.next(&policy), ReconnectDecision::Exhausted { attempts: 5 });
        assert_eq!(state.next(&policy), ReconnectDecision::Exhausted { attempts: 5 });
        assert_eq!(state.attempts(), 5);
    }

    #[test]
    fn test_delay_is_constant() {
        let policy = policy();
        let mut state = ReconnectState::default();
        let delays: Vec<Duration> = (0..3)
            .filter_map(|_| match state.next(&policy) {
                ReconnectDecision::Retry { delay, .. } => Some(delay),
                ReconnectDecision::Exhausted { .. } => None,
            })
            .collect();
        assert!(delays.iter().all(|d| *d == policy.delay));
    }

    #[test]
    fn test_reset_restores_budget() {
        let policy = policy();
        let mut state = ReconnectState::default();
        state.next(&policy);
        state.next(&policy);
        state.reset();
        assert_eq!(state.attempts(), 0);
        assert!(matches!(state.next(&policy), ReconnectDecision::Retry { attempt: 1, .. }));
    }

    #[test]
    fn test_zero_budget_is_exhausted_immediately() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..policy()
        };
        let mut state = ReconnectState::default();
        assert_eq!(state.next(&policy), ReconnectDecision::Exhausted { attempts: 0 });
    }
}
