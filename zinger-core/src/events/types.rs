//! Event type definitions.

use std::path::PathBuf;

/// A clip waiting to be played in a guild's voice session.
///
/// The playback task owns the file from here on and deletes it once
/// playback has finished, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub guild_id: String,
    pub filename: String,
    pub path: PathBuf,
}
