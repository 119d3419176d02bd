//! Configuration management for benchtrack

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level settings, loadable from a TOML file with env overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub refresh: RefreshConfig,
    pub compare: CompareConfig,
    pub series: SeriesConfig,
}

/// Cache refresh scheduling and retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between periodic cache rebuilds.
    pub interval_secs: u64,
    /// Initial backoff after a failed rebuild.
    pub initial_backoff_secs: u64,
    /// Backoff cap.
    pub max_backoff_secs: u64,
    /// Backoff multiplier applied per consecutive failure.
    pub backoff_multiplier: f64,
    /// Add jitter to backoff delays.
    pub jitter: bool,
    /// Timeout for individual result store calls.
    pub store_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            initial_backoff_secs: 1,
            max_backoff_secs: 300,
            backoff_multiplier: 2.0,
            jitter: true,
            store_timeout_secs: 10,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Thresholds for classifying baseline/contender changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Number of historical standard deviations a change must exceed to
    /// count as a regression or improvement.
    pub threshold_z: f64,
    /// Relative threshold used when too little history exists for a
    /// z-score (e.g. 0.05 for +-5%).
    pub fallback_threshold: f64,
    /// Minimum historical sample count required for the z-score path.
    pub min_history_samples: usize,
    /// Timeout for direct store lookups performed during a comparison.
    pub store_timeout_secs: u64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            threshold_z: 5.0,
            fallback_threshold: 0.05,
            min_history_samples: 3,
            store_timeout_secs: 10,
        }
    }
}

impl CompareConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}

/// Display rules for assembled time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Maximum number of rows emitted into the results table.
    pub table_row_cap: usize,
    /// Minimum points a series needs to qualify for plotting.
    pub min_plot_points: usize,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            table_row_cap: 3000,
            min_plot_points: 3,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Apply environment variable overrides on top of the current values.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(interval) = std::env::var("BENCHTRACK_REFRESH_INTERVAL_SECS") {
            self.refresh.interval_secs = interval.parse().unwrap_or(self.refresh.interval_secs);
        }
        if let Ok(threshold) = std::env::var("BENCHTRACK_THRESHOLD_Z") {
            self.compare.threshold_z = threshold.parse().unwrap_or(self.compare.threshold_z);
        }
        if let Ok(cap) = std::env::var("BENCHTRACK_TABLE_ROW_CAP") {
            self.series.table_row_cap = cap.parse().unwrap_or(self.series.table_row_cap);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RefreshConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(120));
        assert_eq!(config.initial_backoff(), Duration::from_secs(1));
        assert!(config.jitter);

        let compare = CompareConfig::default();
        assert_eq!(compare.threshold_z, 5.0);
        assert_eq!(compare.fallback_threshold, 0.05);
    }

    #[test]
    fn test_from_file_and_env_overrides() {
        let path = std::env::temp_dir().join("benchtrack-settings-test.toml");
        std::fs::write(
            &path,
            r#"
            [refresh]
            interval_secs = 45
            "#,
        )
        .unwrap();
        let settings = Settings::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(settings.refresh.interval_secs, 45);
        assert_eq!(settings.series.table_row_cap, 3000);

        std::env::set_var("BENCHTRACK_THRESHOLD_Z", "2.5");
        let settings = settings.apply_env_overrides();
        std::env::remove_var("BENCHTRACK_THRESHOLD_Z");
        assert_eq!(settings.compare.threshold_z, 2.5);
        // File-loaded values survive the override pass.
        assert_eq!(settings.refresh.interval_secs, 45);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("benchtrack-settings-missing.toml");
        assert!(Settings::from_file(&path).is_err());
    }

    #[test]
    fn test_toml_partial_override() {
        let settings: Settings = toml::from_str(
            r#"
            [refresh]
            interval_secs = 30

            [compare]
            threshold_z = 3.5
            "#,
        )
        .unwrap();
        assert_eq!(settings.refresh.interval_secs, 30);
        assert_eq!(settings.compare.threshold_z, 3.5);
        // Untouched sections keep their defaults.
        assert_eq!(settings.series.table_row_cap, 3000);
        assert_eq!(settings.refresh.max_backoff_secs, 300);
    }
}
