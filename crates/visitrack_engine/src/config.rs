//! Configuration for the engine.

use std::time::Duration;
use time::{Date, UtcOffset};
use visitrack_protocol::SortSpec;

/// Configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows per page.
    pub page_size: u32,
    /// Initial sort.
    pub sort: SortSpec,
    /// Day of interest; `None` disables the date filter.
    pub date: Option<Date>,
    /// Offset used to turn `date` into a time range.
    pub utc_offset: UtcOffset,
    /// Access point the view is restricted to.
    pub access_scope: Option<String>,
    /// Whether this view may finalize records.
    pub can_finalize: bool,
    /// How many recent access events the counters remember for dedup.
    pub recent_event_capacity: usize,
    /// Retry configuration for loads.
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Creates a configuration with the given page size.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            sort: SortSpec::default(),
            date: None,
            utc_offset: UtcOffset::UTC,
            access_scope: None,
            can_finalize: false,
            recent_event_capacity: 256,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the initial sort.
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the day of interest.
    pub fn with_date(mut self, date: Date) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the UTC offset used for day boundaries.
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Restricts the view to an access point.
    pub fn with_access_scope(mut self, access_id: impl Into<String>) -> Self {
        self.access_scope = Some(access_id.into());
        self
    }

    /// Sets the finalize capability flag.
    pub fn with_can_finalize(mut self, can_finalize: bool) -> Self {
        self.can_finalize = can_finalize;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, offset};
    use visitrack_protocol::{SortDirection, SortField};

    #[test]
    fn engine_config_builder() {
        let config = EngineConfig::new(25)
            .with_sort(SortSpec::new(SortField::CreatedAt, SortDirection::Asc))
            .with_date(date!(2024 - 05 - 01))
            .with_utc_offset(offset!(-6))
            .with_access_scope("lobby")
            .with_can_finalize(true);

        assert_eq!(config.page_size, 25);
        assert_eq!(config.sort.field, SortField::CreatedAt);
        assert_eq!(config.date, Some(date!(2024 - 05 - 01)));
        assert_eq!(config.access_scope.as_deref(), Some("lobby"));
        assert!(config.can_finalize);
    }

    #[test]
    fn default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.sort, SortSpec::default());
        assert!(config.date.is_none());
        assert!(!config.can_finalize);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(8), Duration::from_secs(5));
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }
}
