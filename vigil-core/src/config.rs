//! Scheduler Configuration
//!
//! Hosts usually build a [`SchedulerConfig`] with `Default` and tweak it, but
//! the type is serde-enabled so it can live in whatever settings file the
//! host already loads.

use serde::{Deserialize, Serialize};

/// How many times one job may run inside a single flush before it is skipped.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Tunables for a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Per-flush execution ceiling for a single job.
    ///
    /// `None` disables the recursion counters entirely.
    pub recursion_limit: Option<usize>,
}

impl SchedulerConfig {
    /// Set the recursion ceiling.
    pub fn with_recursion_limit(mut self, limit: Option<usize>) -> Self {
        self.recursion_limit = limit;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            recursion_limit: Some(DEFAULT_RECURSION_LIMIT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_the_standard_ceiling() {
        assert_eq!(
            SchedulerConfig::default().recursion_limit,
            Some(DEFAULT_RECURSION_LIMIT)
        );
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn null_limit_disables_the_guard() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{ "recursion_limit": null }"#).unwrap();
        assert_eq!(config.recursion_limit, None);
    }
}
