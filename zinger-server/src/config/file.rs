//! TOML file configuration structures.
//!
//! These structs directly map to the optional `zinger.toml` tuning file.
//! Every section and field may be omitted.

use serde::{Deserialize, Serialize};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub retry: RetryConfig,
    pub timeouts: TimeoutsConfig,
    pub watcher: WatcherConfig,
}

/// Retry and dead-letter behaviour of the queue consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per message, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Write permanently failed messages to `<queue>.dead`.
    pub dead_letter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            dead_letter: true,
        }
    }
}

/// Deadlines for outbound calls, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub source_secs: u64,
    pub generation_secs: u64,
    pub synthesis_secs: u64,
    pub transcode_secs: u64,
    pub playback_secs: u64,
    pub broker_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            source_secs: 10,
            generation_secs: 60,
            synthesis_secs: 30,
            transcode_secs: 60,
            playback_secs: 300,
            broker_secs: 10,
        }
    }
}

/// Match watcher polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub interval_secs: u64,
    pub lookback_secs: u64,
    pub max_matches: u32,
    pub player_spacing_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            lookback_secs: 900,
            max_matches: 5,
            player_spacing_ms: 1000,
        }
    }
}
