use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub executor: ExecutorConfig,
    pub station: StationConfig,
}

/// Knobs of the execution engine, passed into each TestExecutor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Seconds a graceful abort waits for the running phase to exit
    pub cancel_timeout_s: f64,
    /// Stop the test with a FAIL outcome on the first failed phase
    pub stop_on_first_failure: bool,
}

impl ExecutorConfig {
    pub fn cancel_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.cancel_timeout_s).unwrap_or(Duration::ZERO)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            cancel_timeout_s: 2.0,
            stop_on_first_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub station_id: String,
    /// Where the combined profile is written when profiling is on
    pub profile_output: Option<PathBuf>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_id: "benchrun-station".to_string(),
            profile_output: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            executor: ExecutorConfig::default(),
            station: StationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir
                .join(project_name)
                .join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.executor.cancel_timeout_s, 2.0);
        assert_eq!(config.executor.cancel_timeout(), Duration::from_secs(2));
        assert!(!config.executor.stop_on_first_failure);
        assert_eq!(config.station.station_id, "benchrun-station");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("benchrun.yml");
        std::fs::write(&path, "executor:\n  stop_on_first_failure: true\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.executor.stop_on_first_failure);
        assert_eq!(config.executor.cancel_timeout_s, 2.0);
        assert_eq!(config.station, StationConfig::default());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_negative_cancel_timeout_is_zero() {
        let config = ExecutorConfig {
            cancel_timeout_s: -1.0,
            stop_on_first_failure: false,
        };
        assert_eq!(config.cancel_timeout(), Duration::ZERO);
    }
}
