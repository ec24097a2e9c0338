//! Match watcher polling configuration.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Time between polling cycles.
    pub interval: Duration,
    /// Only matches started within this window are considered.
    pub lookback: Duration,
    /// Most recent match ids requested per player and cycle.
    pub max_matches: u32,
    /// Pause between two players within one cycle, to stay under the
    /// source's rate limit.
    pub player_spacing: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            lookback: Duration::from_secs(15 * 60),
            max_matches: 5,
            player_spacing: Duration::from_secs(1),
        }
    }
}
