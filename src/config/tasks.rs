//! Background task dispatch configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Bounded queue drained by worker tasks.
    #[default]
    Queued,
    /// Run in the caller, one attempt. Development only.
    Inline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    #[serde(default)]
    pub mode: DispatchMode,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

impl TasksConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 || self.queue_capacity == 0 {
            return Err(ValidationError::InvalidTaskPool);
        }
        if self.max_attempts == 0 || self.initial_delay_secs > self.max_delay_secs {
            return Err(ValidationError::InvalidRetryPolicy);
        }
        Ok(())
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    60
}

fn default_max_delay() -> u64 {
    30 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TasksConfig::default();
        assert_eq!(config.mode, DispatchMode::Queued);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_pool() {
        let config = TasksConfig {
            workers: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidTaskPool));
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let config = TasksConfig {
            initial_delay_secs: 600,
            max_delay_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidRetryPolicy));
    }
}
