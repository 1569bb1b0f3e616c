//! Provider call retry policy, shared by the proposer and the verifier.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::llm::{ModelRole, ProviderError};

/// Max attempts, a retryable-error predicate and a linear backoff schedule.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before attempt n+1 is `backoff * n`.
    pub backoff: Duration,
    pub retryable: fn(&ProviderError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            retryable: ProviderError::is_transient,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay to sleep after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }

    /// Run a blocking provider call under this policy.
    ///
    /// Non-retryable errors (rate limits, other 4xx) return on first
    /// occurrence. `context` is a log label such as the candidate name.
    pub fn run<T, F>(&self, role: ModelRole, context: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Result<T, ProviderError>,
    {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if (self.retryable)(&e) && attempt < self.max_attempts => {
                    tracing::warn!(
                        role = %role,
                        context = %context,
                        attempt,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    std::thread::sleep(self.delay_after(attempt));
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        role = %role,
                        context = %context,
                        attempt,
                        error = %e,
                        "Provider call failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryPolicy {
        RetryPolicy::default().with_backoff(Duration::ZERO)
    }

    #[test]
    fn success_on_first_attempt() {
        let calls = Cell::new(0);
        let result = fast().run(ModelRole::Proposer, "t", || {
            calls.set(calls.get() + 1);
            Ok::<_, ProviderError>(7)
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn transient_error_retried_once() {
        let calls = Cell::new(0);
        let result = fast().run(ModelRole::Verifier, "t", || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(ProviderError::Timeout(30))
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn transient_error_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast().run(ModelRole::Verifier, "t", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::Server { status: 503, message: "busy".into() })
        });
        assert!(matches!(result, Err(ProviderError::Server { status: 503, .. })));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn rate_limit_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast().run(ModelRole::Proposer, "t", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::RateLimited { retry_after_secs: None })
        });
        assert!(matches!(result, Err(ProviderError::RateLimited { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn client_error_not_retried() {
        let calls = Cell::new(0);
        let _: Result<(), _> = fast().run(ModelRole::Proposer, "t", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::Rejected { status: 401, message: "bad key".into() })
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn none_policy_makes_one_attempt() {
        let calls = Cell::new(0);
        let _: Result<(), _> = RetryPolicy::none().run(ModelRole::Proposer, "t", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::Timeout(1))
        });
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn linear_backoff_schedule() {
        let policy = RetryPolicy::from_config(&RetryConfig { max_attempts: 3, backoff_ms: 200 });
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
    }

    #[test]
    fn custom_predicate_is_honored() {
        let policy = RetryPolicy {
            retryable: |e| matches!(e, ProviderError::RateLimited { .. }),
            ..fast()
        };
        let calls = Cell::new(0);
        let _: Result<(), _> = policy.run(ModelRole::Proposer, "t", || {
            calls.set(calls.get() + 1);
            Err(ProviderError::RateLimited { retry_after_secs: Some(1) })
        });
        assert_eq!(calls.get(), 2);
    }
}
