//! Deadlines for outbound calls.

use std::time::Duration;

/// Deadline for each kind of outbound call.
///
/// Expiry of any of these is a permanent failure for the message in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Match-data source requests.
    pub source: Duration,
    /// Commentary generation.
    pub generation: Duration,
    /// Speech synthesis.
    pub synthesis: Duration,
    /// Opus transcoding.
    pub transcode: Duration,
    /// Playback of one clip.
    pub playback: Duration,
    /// Broker publish including confirmation.
    pub broker: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            source: Duration::from_secs(10),
            generation: Duration::from_secs(60),
            synthesis: Duration::from_secs(30),
            transcode: Duration::from_secs(60),
            playback: Duration::from_secs(300),
            broker: Duration::from_secs(10),
        }
    }
}
