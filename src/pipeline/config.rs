//! Pipeline configuration

use std::time::Duration;

/// Capture loop failure policy and threading options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Consecutive failed grabs tolerated before the pipeline fails
    pub max_consecutive_failures: u32,

    /// Pause after a failed grab before retrying
    pub retry_backoff: Duration,

    /// Name of the capture thread
    pub thread_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            retry_backoff: Duration::from_millis(100),
            thread_name: "framecast-capture".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Set the consecutive failure limit (minimum 1)
    pub fn max_consecutive_failures(mut self, failures: u32) -> Self {
        self.max_consecutive_failures = failures.max(1);
        self
    }

    /// Set the retry backoff
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the capture thread name
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();

        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.retry_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_builder_failure_limit_floor() {
        let config = PipelineConfig::default().max_consecutive_failures(0);

        assert_eq!(config.max_consecutive_failures, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = PipelineConfig::default()
            .max_consecutive_failures(3)
            .retry_backoff(Duration::from_millis(5))
            .thread_name("cam0");

        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(5));
        assert_eq!(config.thread_name, "cam0");
    }
}
