//! Event channel factories and handles.

use super::types::PlaybackRequest;
use tokio::sync::mpsc;

/// Default buffer size for a guild's playback channel.
///
/// The dispatcher awaits capacity before acknowledging a message, so a full
/// channel pushes back on the broker instead of growing without bound.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Sender handle for PlaybackRequest events.
pub type PlaybackRequestSender = mpsc::Sender<PlaybackRequest>;
/// Receiver handle for PlaybackRequest events.
pub type PlaybackRequestReceiver = mpsc::Receiver<PlaybackRequest>;

/// Create a new PlaybackRequest channel.
///
/// Each guild has its own channel and playback task.
pub fn playback_channel() -> (PlaybackRequestSender, PlaybackRequestReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
