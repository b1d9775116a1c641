use std::time::Duration;

use shared::error::PageError;

pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential backoff: `base * 2^attempt`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn should_retry(&self, failures_so_far: u32, error: &PageError) -> bool {
        error.is_retryable() && failures_so_far < self.max_retries
    }
}

/// Maps a collaborator failure onto the page error taxonomy. Typed
/// `PageError`s pass through; anything else is classified by message.
pub fn classify_failure(err: &anyhow::Error) -> PageError {
    if let Some(page_error) = err.downcast_ref::<PageError>() {
        return page_error.clone();
    }
    PageError::classify(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use shared::error::PageErrorKind;

    #[test]
    fn backoff_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[test]
    fn retry_budget_is_two_for_retryable_errors() {
        let policy = RetryPolicy::default();
        let timeout = PageError::classify("Request timeout");
        assert!(policy.should_retry(0, &timeout));
        assert!(policy.should_retry(1, &timeout));
        assert!(!policy.should_retry(2, &timeout));
    }

    #[test]
    fn terminal_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(0, &PageError::classify("unauthorized")));
        assert!(!RetryPolicy::disabled().should_retry(0, &PageError::classify("timeout")));
    }

    #[test]
    fn typed_errors_survive_classification() {
        let err = anyhow::Error::new(PageError::malformed("missing `total`"));
        assert_eq!(classify_failure(&err).kind, PageErrorKind::MalformedResponse);
    }

    #[test]
    fn context_chain_is_inspected() {
        let err = anyhow!("gateway timeout").context("fetching products");
        let classified = classify_failure(&err);
        assert_eq!(classified.kind, PageErrorKind::Timeout);
        assert!(classified.message.contains("fetching products"));
    }
}
