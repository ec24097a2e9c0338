//! Tracked-player store request and response types.

use serde::{Deserialize, Serialize};

/// A player whose matches are watched on behalf of a guild.
///
/// Field names follow the store's wire format. Identity is
/// `(summoner_name, summoner_tagline)` within a guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedPlayer {
    pub summoner_name: String,
    pub summoner_guild_id: String,
    #[serde(default)]
    pub summoner_tagline: String,
}

impl TrackedPlayer {
    pub fn new(
        name: impl Into<String>,
        tagline: impl Into<String>,
        guild_id: impl Into<String>,
    ) -> Self {
        Self {
            summoner_name: name.into(),
            summoner_guild_id: guild_id.into(),
            summoner_tagline: tagline.into(),
        }
    }

    /// `name#tagline`, the form players use to identify themselves.
    pub fn riot_id(&self) -> String {
        format!("{}#{}", self.summoner_name, self.summoner_tagline)
    }

    /// Returns the name of the first blank field, if any.
    pub fn blank_field(&self) -> Option<&'static str> {
        if self.summoner_name.trim().is_empty() {
            Some("summoner_name")
        } else if self.summoner_guild_id.trim().is_empty() {
            Some("summoner_guild_id")
        } else if self.summoner_tagline.trim().is_empty() {
            Some("summoner_tagline")
        } else {
            None
        }
    }
}

/// Body returned by the store's mutating endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}
