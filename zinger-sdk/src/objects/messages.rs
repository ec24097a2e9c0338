//! Queue message schemas.
//!
//! `guild_id` is the only routing key back to a voice session and is copied
//! verbatim from one message to the next.

use serde::{Deserialize, Serialize};

/// A newly observed match for one tracked player, published on `matches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub match_id: String,
    pub guild_id: String,
    pub summoner_name: String,
    pub summoner_tagline: String,
    pub outcome: MatchOutcome,
}

/// Facts about how the tracked player did in a match.
///
/// Every field is optional-or-empty because the match-data source does not
/// guarantee them for every game mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    #[serde(default)]
    pub placement: Option<u32>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub last_round: Option<u32>,
    /// Active trait names, strongest first.
    #[serde(default)]
    pub traits: Vec<String>,
    /// Unit identifiers on the final board.
    #[serde(default)]
    pub units: Vec<String>,
    #[serde(default)]
    pub game_length_secs: Option<u32>,
}

/// Generated commentary for a guild, published on `zingers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentaryMessage {
    #[serde(rename = "zinger")]
    pub text: String,
    pub guild_id: String,
}

/// A finished, playable audio file for a guild, published on `audio_queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioReadyMessage {
    /// File stem, `tts_<token>`.
    pub filename: String,
    /// Absolute path of the Opus file in the shared audio directory.
    pub path: String,
    pub guild_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commentary_uses_zinger_field() {
        let msg: CommentaryMessage =
            serde_json::from_str(r#"{"zinger": "gg ez", "guild_id": "123"}"#).unwrap();
        assert_eq!(msg.text, "gg ez");
        assert_eq!(msg.guild_id, "123");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["zinger"], "gg ez");
        assert!(json.get("text").is_none());
    }

    #[test]
    fn commentary_rejects_numeric_guild() {
        let result: Result<CommentaryMessage, _> =
            serde_json::from_str(r#"{"zinger": "gg ez", "guild_id": 123}"#);
        assert!(result.is_err());
    }

    #[test]
    fn match_event_tolerates_sparse_outcome() {
        let event: MatchEvent = serde_json::from_str(
            r#"{
                "match_id": "NA1_1",
                "guild_id": "42",
                "summoner_name": "Foo",
                "summoner_tagline": "NA1",
                "outcome": {"placement": 8}
            }"#,
        )
        .unwrap();
        assert_eq!(event.outcome.placement, Some(8));
        assert!(event.outcome.traits.is_empty());
        assert_eq!(event.outcome.level, None);
    }
}
