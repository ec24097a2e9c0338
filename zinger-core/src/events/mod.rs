//! In-process events of the audio dispatcher.
//!
//! The broker carries work between processes; inside the dispatcher each
//! voice session gets a bounded channel of [`PlaybackRequest`]s drained by
//! one playback task, which keeps a guild's clips in order.

pub mod channels;
pub mod types;

pub use channels::{
    PlaybackRequestReceiver, PlaybackRequestSender, playback_channel, DEFAULT_CHANNEL_BUFFER,
};

pub use types::PlaybackRequest;
