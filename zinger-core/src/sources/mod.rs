//! External collaborators of the pipeline.
//!
//! Each collaborator is a trait with one production adapter:
//!
//! - [`MatchSource`] / [`RiotMatchSource`]: match ids and match details.
//! - [`CommentaryModel`] / [`AnthropicCommentary`]: text generation.
//! - [`SpeechEngine`] / [`TranslateSpeechEngine`], [`CommandSpeechEngine`]:
//!   text to raw audio.
//! - [`Transcoder`] / [`FfmpegTranscoder`]: raw audio to Opus.
//! - [`VoiceSession`] / [`CommandVoiceSession`], looked up through
//!   [`VoiceSessions`]: playback in a guild's voice channel.
//! - [`PlayerDirectory`]: the tracked-player list, through the cache and
//!   the store.

pub mod commentary;
pub mod players;
pub mod riot;
pub mod speech;
pub mod voice;

pub use commentary::{AnthropicCommentary, CommentaryError, CommentaryModel};
pub use players::{PlayerDirectory, PlayerSource};
pub use riot::RiotMatchSource;
pub use speech::{
    CommandSpeechEngine, FfmpegTranscoder, SpeechEngine, SpeechError, Transcoder,
    TranslateSpeechEngine,
};
pub use voice::{CommandVoiceSession, PlaybackError, VoiceSession, VoiceSessions};

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`MatchSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The source answered with an unexpected status
    #[error("source returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// The requested account or match does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The request exceeded its deadline
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
}

/// Source of match ids and match details for a player.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// Resolve a Riot id to the player's PUUID.
    async fn resolve_puuid(&self, name: &str, tagline: &str) -> Result<String, SourceError>;

    /// Ids of at most `count` matches that started at or after `start_time`
    /// (unix seconds), newest first.
    async fn recent_match_ids(
        &self,
        puuid: &str,
        start_time: i64,
        count: u32,
    ) -> Result<Vec<String>, SourceError>;

    async fn match_detail(&self, match_id: &str) -> Result<MatchDetail, SourceError>;
}

/// The subset of a match detail document the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchDetail {
    #[serde(default)]
    pub metadata: MatchMetadata,
    #[serde(default)]
    pub info: MatchInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchMetadata {
    #[serde(default)]
    pub match_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MatchInfo {
    /// Seconds.
    #[serde(default)]
    pub game_length: f64,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Participant {
    pub puuid: String,
    #[serde(default)]
    pub placement: Option<u32>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub last_round: Option<u32>,
    #[serde(default)]
    pub traits: Vec<TraitEntry>,
    #[serde(default)]
    pub units: Vec<UnitEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TraitEntry {
    pub name: String,
    #[serde(default)]
    pub num_units: u32,
    /// 0 when the trait is not active.
    #[serde(default)]
    pub tier_current: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UnitEntry {
    pub character_id: String,
    /// Star level.
    #[serde(default)]
    pub tier: u32,
}

impl MatchDetail {
    pub fn participant(&self, puuid: &str) -> Option<&Participant> {
        self.info.participants.iter().find(|p| p.puuid == puuid)
    }
}
