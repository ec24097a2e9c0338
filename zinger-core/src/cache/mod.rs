//! Cache-backed bookkeeping shared across processes.
//!
//! Three concerns live in the cache, each behind its own trait so that a
//! stage only depends on what it uses:
//!
//! - [`DedupStore`]: which match ids have already been published per player.
//! - [`PlayerListCache`]: the short-lived copy of the tracked-player list,
//!   invalidated by the store on every add/update.
//! - [`PuuidCache`]: resolved player ids, which never change for a Riot id.
//!
//! [`RedisCache`] implements all three against Redis; [`MemoryCache`] does
//! the same in process, with the same expiry, for tests and as the watcher's
//! fallback when Redis is unreachable.

mod memory_cache;
mod redis_cache;

pub use memory_cache::MemoryCache;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use zinger_sdk::objects::TrackedPlayer;

/// How long a published match id stays recorded.
pub const DEDUP_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);
/// How long a cached tracked-player list is trusted.
pub const PLAYER_LIST_TTL: Duration = Duration::from_secs(5 * 60);
/// How long a resolved PUUID is cached.
pub const PUUID_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors that can occur while talking to the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Cached value could not be (de)serialized
    #[error("cached value serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache refused the operation
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Per-player record of match ids that have already been published.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Return the subset of `match_ids` not yet recorded for `player`,
    /// preserving input order.
    async fn unseen(
        &self,
        player: &TrackedPlayer,
        match_ids: &[String],
    ) -> Result<Vec<String>, CacheError>;

    /// Record `match_id` as published for `player`.
    async fn mark_seen(&self, player: &TrackedPlayer, match_id: &str) -> Result<(), CacheError>;
}

/// Short-lived copy of the tracked-player list.
///
/// Fills are guarded by a generation counter: read it with
/// [`PlayerListCache::players_generation`] before reading the store, and pass
/// it to [`PlayerListCache::store_players`]. A fill whose generation has been
/// bumped by an invalidation in the meantime is discarded, so a list read
/// before a write never outlives that write's invalidation.
#[async_trait]
pub trait PlayerListCache: Send + Sync {
    async fn cached_players(&self) -> Result<Option<Vec<TrackedPlayer>>, CacheError>;

    async fn players_generation(&self) -> Result<u64, CacheError>;

    /// Cache `players` if the generation is still `generation`. Returns
    /// whether the list was stored.
    async fn store_players(
        &self,
        players: &[TrackedPlayer],
        generation: u64,
    ) -> Result<bool, CacheError>;

    /// Drop the cached list and bump the generation, so the next reader goes
    /// to the store and in-flight fills are discarded.
    async fn invalidate_players(&self) -> Result<(), CacheError>;
}

/// Resolved PUUIDs keyed by Riot id.
#[async_trait]
pub trait PuuidCache: Send + Sync {
    async fn cached_puuid(&self, player: &TrackedPlayer) -> Result<Option<String>, CacheError>;

    async fn store_puuid(&self, player: &TrackedPlayer, puuid: &str) -> Result<(), CacheError>;
}

/// Key of the dedup flag for one published match.
///
/// Scoped by guild so the same player tracked in two guilds is announced in
/// both.
pub(crate) fn seen_key(player: &TrackedPlayer, match_id: &str) -> String {
    format!(
        "zinger:seen:{}:{}:{}",
        player.summoner_guild_id,
        player.riot_id(),
        match_id
    )
}

pub(crate) fn puuid_key(player: &TrackedPlayer) -> String {
    format!("zinger:puuid:{}", player.riot_id())
}

pub(crate) const PLAYERS_KEY: &str = "zinger:players";
pub(crate) const PLAYERS_GENERATION_KEY: &str = "zinger:players:generation";
