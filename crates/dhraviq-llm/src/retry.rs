//! Bounded retry with exponential backoff, as an explicit state machine.
//!
//! `RetryState` owns the attempt counter and the delay to use before the next
//! attempt. Callers report each failure and get back either the delay to
//! sleep or `GiveUp`; nothing here sleeps or touches a backend.

use std::time::Duration;

use dhraviq_core::GatewayError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delays slept between attempts when every attempt fails transiently.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut state = RetryState::new(self.clone());
        let mut delays = Vec::new();
        loop {
            state.begin_attempt();
            match state.on_failure(&GatewayError::ProviderOverloaded) {
                RetryDecision::Retry(delay) => delays.push(delay),
                RetryDecision::GiveUp => return delays,
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

#[derive(Clone, Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    next_delay: Duration,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        let next_delay = policy.base_delay;
        Self {
            policy,
            attempt: 0,
            next_delay,
        }
    }

    /// Mark the start of an attempt. Returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Decide what follows a failed attempt.
    ///
    /// Fatal errors and exhausted budgets give up. Otherwise the current
    /// delay (or a server-suggested one, capped at `max_delay`) is returned
    /// and the next delay grows by `multiplier`.
    pub fn on_failure(&mut self, error: &GatewayError) -> RetryDecision {
        if error.is_fatal() || !error.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if self.attempt >= self.policy.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = error
            .suggested_delay()
            .unwrap_or(self.next_delay)
            .min(self.policy.max_delay);
        self.next_delay = self
            .next_delay
            .saturating_mul(self.policy.multiplier)
            .min(self.policy.max_delay);
        RetryDecision::Retry(delay)
    }
}
