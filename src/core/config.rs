// src/core/config.rs

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::core::error::EnumError;

/// Number of accepted names after which the duplicate filter starts over.
pub const FILTER_MAX_SIZE: usize = 1 << 16;

/// Settings for one enumeration run.
///
/// Every field has a default, so a JSON file only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumConfig {
    /// Identifies this run when attributing graph edges.
    pub run_id: String,
    pub domains: Vec<String>,
    pub filter_max_size: usize,
    /// How often buffered duplicates are checked against the graph.
    pub reconcile_interval_secs: u64,
    /// How long a duplicate waits before it is reconciled.
    pub grace_period_secs: u64,
    pub counter_channel_capacity: usize,
    pub workers: usize,
    pub entry_channel_capacity: usize,
    /// Dispatch budget handed to each drain of the output queue.
    pub output_batch: usize,
    pub output_interval_ms: u64,
    /// The run ends after the pipeline has been quiet this long.
    pub idle_timeout_ms: u64,
}

impl Default for EnumConfig {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            domains: Vec::new(),
            filter_max_size: FILTER_MAX_SIZE,
            reconcile_interval_secs: 5,
            grace_period_secs: 10 * 60,
            counter_channel_capacity: 10,
            workers: 8,
            entry_channel_capacity: 1024,
            output_batch: 100,
            output_interval_ms: 250,
            idle_timeout_ms: 2000,
        }
    }
}

impl EnumConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EnumError> {
        let raw = std::fs::read_to_string(path)?;
        let config: EnumConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains.extend(domains.into_iter().map(Into::into));
        self
    }

    pub fn validate(&self) -> Result<(), EnumError> {
        let positive = [
            ("filter_max_size", self.filter_max_size as u64),
            ("reconcile_interval_secs", self.reconcile_interval_secs),
            ("counter_channel_capacity", self.counter_channel_capacity as u64),
            ("workers", self.workers as u64),
            ("entry_channel_capacity", self.entry_channel_capacity as u64),
            ("output_interval_ms", self.output_interval_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(EnumError::Config(format!("{field} must be greater than zero")));
        }
        if self.run_id.trim().is_empty() {
            return Err(EnumError::Config("run_id must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn output_interval(&self) -> Duration {
        Duration::from_millis(self.output_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reconciliation_schedule() {
        let config = EnumConfig::default();

        assert_eq!(config.reconcile_interval(), Duration::from_secs(5));
        assert_eq!(config.grace_period(), Duration::from_secs(600));
        assert_eq!(config.filter_max_size, 65_536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EnumConfig =
            serde_json::from_str(r#"{"domains": ["example.com"], "workers": 2}"#).unwrap();

        assert_eq!(config.domains, vec!["example.com"]);
        assert_eq!(config.workers, 2);
        assert_eq!(config.counter_channel_capacity, 10);
        assert!(!config.run_id.is_empty());
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let config = EnumConfig {
            filter_max_size: 0,
            ..EnumConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("filter_max_size"));
    }

    #[test]
    fn from_file_reports_missing_files() {
        let err = EnumConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, EnumError::Io(_)));
    }
}
