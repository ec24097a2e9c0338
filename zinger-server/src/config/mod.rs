//! Configuration module for the zinger binary.
//!
//! Connection settings come from flags and environment variables (see
//! `main.rs`); tuning knobs come from an optional TOML file handled here.

pub mod file;

use crate::config::file::{FileConfig, RetryConfig, TimeoutsConfig, WatcherConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use zinger_core::config::{RetryPolicy, Timeouts, WatcherSettings};

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
    pub watcher: WatcherSettings,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader. Without a path every setting takes its
    /// default.
    pub fn new(config_path: Option<&Path>) -> Self {
        Self {
            config_path: config_path.map(Path::to_path_buf),
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if one was given
    /// 2. Validate the configuration
    /// 3. Convert it into the runtime types
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match &self.config_path {
            Some(path) => {
                let config_content = std::fs::read_to_string(path)?;
                toml::from_str(&config_content)?
            }
            None => FileConfig::default(),
        };

        self.validate(&file_config)?;

        Ok(LoadedConfig {
            retry: convert_retry(&file_config.retry),
            timeouts: convert_timeouts(&file_config.timeouts),
            watcher: convert_watcher(&file_config.watcher),
        })
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if config.retry.base_delay_ms > config.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }

        let t = &config.timeouts;
        for (name, secs) in [
            ("source_secs", t.source_secs),
            ("generation_secs", t.generation_secs),
            ("synthesis_secs", t.synthesis_secs),
            ("transcode_secs", t.transcode_secs),
            ("playback_secs", t.playback_secs),
            ("broker_secs", t.broker_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "timeouts.{name} must be non-zero"
                )));
            }
        }

        if config.watcher.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "watcher.interval_secs must be at least 1".into(),
            ));
        }
        if config.watcher.max_matches == 0 {
            return Err(ConfigError::ValidationError(
                "watcher.max_matches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn convert_retry(r: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: r.max_attempts,
        base_delay: Duration::from_millis(r.base_delay_ms),
        max_delay: Duration::from_millis(r.max_delay_ms),
        dead_letter: r.dead_letter,
    }
}

fn convert_timeouts(t: &TimeoutsConfig) -> Timeouts {
    Timeouts {
        source: Duration::from_secs(t.source_secs),
        generation: Duration::from_secs(t.generation_secs),
        synthesis: Duration::from_secs(t.synthesis_secs),
        transcode: Duration::from_secs(t.transcode_secs),
        playback: Duration::from_secs(t.playback_secs),
        broker: Duration::from_secs(t.broker_secs),
    }
}

fn convert_watcher(w: &WatcherConfig) -> WatcherSettings {
    WatcherSettings {
        interval: Duration::from_secs(w.interval_secs),
        lookback: Duration::from_secs(w.lookback_secs),
        max_matches: w.max_matches,
        player_spacing: Duration::from_millis(w.player_spacing_ms),
    }
}
