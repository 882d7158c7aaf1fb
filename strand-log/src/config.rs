//! Configuration for a log manager.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LogError, Result};
use crate::partitioner::Partitioner;

/// Configuration shared by every log opened from one manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Unique identity of this process among all writers sharing a log.
    /// Two live processes must not share a sender id.
    #[serde(default = "default_sender_id")]
    pub sender_id: String,

    /// Interval between backing-store scans per partition.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How far behind the current time the pollers read. A write's key is
    /// assigned before its durable put completes, so entries younger than
    /// this margin may still be racing a smaller-keyed write and are left
    /// for a later cycle. Must cover the worst-case gap between key
    /// assignment and put completion, plus clock skew between writers.
    #[serde(default = "default_read_lag", with = "humantime_serde")]
    pub read_lag: Duration,

    /// Partition count used by logs in spread mode.
    #[serde(default = "default_partition_count")]
    pub partition_count: u32,

    /// Whether logs default to fixed-partition (order-preserving) mode.
    #[serde(default = "default_fixed_partitions")]
    pub fixed_partitions: bool,

    /// Per-log-name override of the fixed-partition flag. Lets sequential
    /// replay logs stay ordered while fan-out logs spread.
    #[serde(default)]
    pub fixed_partition_overrides: HashMap<String, bool>,
}

fn default_sender_id() -> String {
    format!("strand-{}", std::process::id())
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_read_lag() -> Duration {
    Duration::from_millis(500)
}

fn default_partition_count() -> u32 {
    1
}

fn default_fixed_partitions() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sender_id: default_sender_id(),
            poll_interval: default_poll_interval(),
            read_lag: default_read_lag(),
            partition_count: default_partition_count(),
            fixed_partitions: default_fixed_partitions(),
            fixed_partition_overrides: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// Set the sender identity.
    #[must_use]
    pub fn with_sender_id(mut self, id: impl Into<String>) -> Self {
        self.sender_id = id.into();
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the read-visibility margin.
    #[must_use]
    pub fn with_read_lag(mut self, lag: Duration) -> Self {
        self.read_lag = lag;
        self
    }

    /// Set the spread-mode partition count.
    #[must_use]
    pub fn with_partition_count(mut self, count: u32) -> Self {
        self.partition_count = count;
        self
    }

    /// Set the default fixed-partition flag.
    #[must_use]
    pub fn with_fixed_partitions(mut self, fixed: bool) -> Self {
        self.fixed_partitions = fixed;
        self
    }

    /// Override the fixed-partition flag for one log name.
    #[must_use]
    pub fn with_fixed_partition_override(mut self, log_name: impl Into<String>, fixed: bool) -> Self {
        self.fixed_partition_overrides.insert(log_name.into(), fixed);
        self
    }

    /// Resolve the partitioner for a log name, applying the override table.
    #[must_use]
    pub fn partitioner_for(&self, log_name: &str) -> Partitioner {
        let fixed = self
            .fixed_partition_overrides
            .get(log_name)
            .copied()
            .unwrap_or(self.fixed_partitions);
        if fixed {
            Partitioner::Fixed
        } else {
            Partitioner::Spread {
                count: self.partition_count.max(1),
            }
        }
    }

    /// Check invariants the manager relies on.
    pub fn validate(&self) -> Result<()> {
        if self.sender_id.is_empty() {
            return Err(LogError::Config("sender_id must not be empty".to_string()));
        }
        if self.partition_count == 0 {
            return Err(LogError::Config(
                "partition_count must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(LogError::Config(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = LogConfig::default();

        assert!(!config.sender_id.is_empty());
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.read_lag, Duration::from_millis(500));
        assert_eq!(config.partition_count, 1);
        assert!(config.fixed_partitions);
        assert!(config.fixed_partition_overrides.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn config_builder_pattern() {
        let config = LogConfig::default()
            .with_sender_id("instance-7")
            .with_poll_interval(Duration::from_millis(50))
            .with_read_lag(Duration::from_millis(100))
            .with_partition_count(8)
            .with_fixed_partitions(false);

        assert_eq!(config.sender_id, "instance-7");
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.read_lag, Duration::from_millis(100));
        assert_eq!(config.partition_count, 8);
        assert!(!config.fixed_partitions);
    }

    #[test]
    fn override_table_beats_default_flag() {
        let config = LogConfig::default()
            .with_partition_count(4)
            .with_fixed_partitions(true)
            .with_fixed_partition_override("fanout", false);

        assert_eq!(config.partitioner_for("replay"), Partitioner::Fixed);
        assert_eq!(
            config.partitioner_for("fanout"),
            Partitioner::Spread { count: 4 }
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(LogConfig::default().with_sender_id("").validate().is_err());
        assert!(
            LogConfig::default()
                .with_partition_count(0)
                .validate()
                .is_err()
        );
        assert!(
            LogConfig::default()
                .with_poll_interval(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = LogConfig::default()
            .with_sender_id("instance-1")
            .with_poll_interval(Duration::from_millis(250))
            .with_fixed_partition_override("fanout", false);

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("250ms"), "humantime duration: {json}");

        let back: LogConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sender_id, "instance-1");
        assert_eq!(back.poll_interval, Duration::from_millis(250));
        assert_eq!(back.fixed_partition_overrides.get("fanout"), Some(&false));
    }
}
