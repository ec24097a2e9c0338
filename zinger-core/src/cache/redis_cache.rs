use super::{
    CacheError, DEDUP_RETENTION, DedupStore, PLAYER_LIST_TTL, PLAYERS_GENERATION_KEY,
    PLAYERS_KEY, PUUID_TTL, PlayerListCache, PuuidCache, puuid_key, seen_key,
};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

/// Sets `KEYS[1]` to `ARGV[2]` with a TTL of `ARGV[3]` seconds only while
/// the generation in `KEYS[2]` still equals `ARGV[1]`.
const STORE_IF_GENERATION: &str = r"
local current = redis.call('GET', KEYS[2]) or '0'
if current ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return 1
";
use zinger_sdk::objects::TrackedPlayer;

/// Redis-backed cache.
///
/// Holds a [`ConnectionManager`], which reconnects on its own after a
/// connection drop; cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }

    /// Build the connection URL from a `host:port` pair and database index.
    pub fn url(host: &str, db: u32) -> String {
        format!("redis://{host}/{db}")
    }
}

#[async_trait]
impl DedupStore for RedisCache {
    async fn unseen(
        &self,
        player: &TrackedPlayer,
        match_ids: &[String],
    ) -> Result<Vec<String>, CacheError> {
        if match_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for match_id in match_ids {
            pipe.exists(seen_key(player, match_id));
        }
        let mut conn = self.conn.clone();
        let seen: Vec<bool> = pipe.query_async(&mut conn).await?;

        Ok(match_ids
            .iter()
            .zip(seen)
            .filter(|(_, seen)| !seen)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn mark_seen(&self, player: &TrackedPlayer, match_id: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(seen_key(player, match_id), 1u8, DEDUP_RETENTION.as_secs())
            .await?;
        debug!(player = %player.riot_id(), match_id, "Recorded match as seen");
        Ok(())
    }
}

#[async_trait]
impl PlayerListCache for RedisCache {
    async fn cached_players(&self) -> Result<Option<Vec<TrackedPlayer>>, CacheError> {
        let mut conn = self.conn.clone();
        let cached: Option<String> = conn.get(PLAYERS_KEY).await?;
        cached
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn players_generation(&self) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let generation: Option<u64> = conn.get(PLAYERS_GENERATION_KEY).await?;
        Ok(generation.unwrap_or(0))
    }

    async fn store_players(
        &self,
        players: &[TrackedPlayer],
        generation: u64,
    ) -> Result<bool, CacheError> {
        let json = serde_json::to_string(players)?;
        let mut conn = self.conn.clone();
        let stored: i64 = redis::Script::new(STORE_IF_GENERATION)
            .key(PLAYERS_KEY)
            .key(PLAYERS_GENERATION_KEY)
            .arg(generation)
            .arg(json)
            .arg(PLAYER_LIST_TTL.as_secs())
            .invoke_async(&mut conn)
            .await?;
        if stored == 0 {
            debug!(generation, "Discarded player list read before an invalidation");
        }
        Ok(stored == 1)
    }

    async fn invalidate_players(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .incr(PLAYERS_GENERATION_KEY, 1)
            .ignore()
            .del(PLAYERS_KEY)
            .ignore()
            .query_async(&mut conn)
            .await?;
        debug!("Invalidated cached player list");
        Ok(())
    }
}

#[async_trait]
impl PuuidCache for RedisCache {
    async fn cached_puuid(&self, player: &TrackedPlayer) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let puuid: Option<String> = conn.get(puuid_key(player)).await?;
        Ok(puuid)
    }

    async fn store_puuid(&self, player: &TrackedPlayer, puuid: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(puuid_key(player), puuid, PUUID_TTL.as_secs())
            .await?;
        Ok(())
    }
}
