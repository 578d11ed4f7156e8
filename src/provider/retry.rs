//! Bounded retry with exponential backoff around a provider.

use super::{BookProvider, ProviderBook, ProviderError, SearchHit};
use tracing::warn;

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries before giving up.
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds (cap for exponential growth).
    pub max_backoff_ms: u64,
    /// Multiplier applied to backoff after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Backoff duration in milliseconds for a given retry count.
    pub fn backoff_ms(&self, retry_count: u32) -> u64 {
        let backoff =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry_count as i32);
        backoff.min(self.max_backoff_ms as f64) as u64
    }

    pub fn should_retry(&self, error: &ProviderError, retry_count: u32) -> bool {
        error.is_retryable() && retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Wraps a [`BookProvider`], retrying retryable failures per the policy.
pub struct RetryingProvider<P: BookProvider> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: BookProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    fn with_retries<T>(
        &self,
        what: &str,
        call: impl Fn(&P) -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let mut retry_count = 0;
        loop {
            match call(&self.inner) {
                Ok(value) => return Ok(value),
                Err(e) if self.policy.should_retry(&e, retry_count) => {
                    let backoff = self.policy.backoff_ms(retry_count);
                    warn!(
                        "Provider {} failed ({}), retry {}/{} in {}ms",
                        what,
                        e,
                        retry_count + 1,
                        self.policy.max_retries,
                        backoff
                    );
                    std::thread::sleep(std::time::Duration::from_millis(backoff));
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<P: BookProvider> BookProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch_by_id(&self, id: &str) -> Result<Option<ProviderBook>, ProviderError> {
        self.with_retries("fetch_by_id", |p| p.fetch_by_id(id))
    }

    fn supports_search(&self) -> bool {
        self.inner.supports_search()
    }

    fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError> {
        self.with_retries("search", |p| p.search(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
        failures_before_success: usize,
        error: fn() -> ProviderError,
    }

    impl BookProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn fetch_by_id(&self, _id: &str) -> Result<Option<ProviderBook>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err((self.error)())
            } else {
                Ok(None)
            }
        }

        fn supports_search(&self) -> bool {
            false
        }

        fn search(&self, _query: &str) -> Result<Vec<SearchHit>, ProviderError> {
            Err(ProviderError::SearchUnsupported)
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_retries_transient_failures() {
        let provider = RetryingProvider::new(
            FlakyProvider {
                calls: AtomicUsize::new(0),
                failures_before_success: 2,
                error: || ProviderError::Transport("connection reset".to_string()),
            },
            fast_policy(3),
        );
        assert!(provider.fetch_by_id("x").unwrap().is_none());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let provider = RetryingProvider::new(
            FlakyProvider {
                calls: AtomicUsize::new(0),
                failures_before_success: 10,
                error: || ProviderError::Status(503),
            },
            fast_policy(2),
        );
        assert!(provider.fetch_by_id("x").is_err());
        // initial attempt + 2 retries
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_non_retryable_error_fails_fast() {
        let provider = RetryingProvider::new(
            FlakyProvider {
                calls: AtomicUsize::new(0),
                failures_before_success: 10,
                error: || ProviderError::Status(400),
            },
            fast_policy(5),
        );
        assert!(provider.fetch_by_id("x").is_err());
        assert_eq!(provider.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 4000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.backoff_ms(0), 1000);
        assert_eq!(policy.backoff_ms(1), 2000);
        assert_eq!(policy.backoff_ms(2), 4000);
        assert_eq!(policy.backoff_ms(5), 4000);
    }
}
