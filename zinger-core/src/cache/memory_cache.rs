use super::{
    CacheError, DEDUP_RETENTION, DedupStore, PLAYER_LIST_TTL, PLAYERS_KEY, PUUID_TTL,
    PlayerListCache, PuuidCache, puuid_key, seen_key,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use zinger_sdk::objects::TrackedPlayer;

#[derive(Debug, Default)]
struct Inner {
    seen: HashMap<String, Instant>,
    values: HashMap<String, (String, Instant)>,
    players_generation: u64,
}

impl Inner {
    fn is_seen(&self, key: &str, now: Instant) -> bool {
        self.seen.get(key).is_some_and(|deadline| *deadline > now)
    }

    fn value(&mut self, key: &str, now: Instant) -> Option<String> {
        match self.values.get(key) {
            Some((value, deadline)) if *deadline > now => Some(value.clone()),
            Some(_) => {
                self.values.remove(key);
                None
            }
            None => None,
        }
    }

    fn set_value(&mut self, key: String, value: String, ttl: Duration) {
        self.values.insert(key, (value, Instant::now() + ttl));
    }
}

/// In-process cache with the same expiry rules as [`super::RedisCache`].
///
/// Cloning shares the underlying maps. [`MemoryCache::set_unavailable`]
/// makes every call fail, for exercising degraded paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Mutex<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether `match_id` is recorded for `player`.
    pub fn is_seen(&self, player: &TrackedPlayer, match_id: &str) -> bool {
        self.lock()
            .is_seen(&seen_key(player, match_id), Instant::now())
    }

    /// Number of dedup records still held, expired or not.
    pub fn seen_len(&self) -> usize {
        self.lock().seen.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DedupStore for MemoryCache {
    async fn unseen(
        &self,
        player: &TrackedPlayer,
        match_ids: &[String],
    ) -> Result<Vec<String>, CacheError> {
        self.check()?;
        let now = Instant::now();
        let inner = self.lock();
        Ok(match_ids
            .iter()
            .filter(|id| !inner.is_seen(&seen_key(player, id), now))
            .cloned()
            .collect())
    }

    async fn mark_seen(&self, player: &TrackedPlayer, match_id: &str) -> Result<(), CacheError> {
        self.check()?;
        let now = Instant::now();
        let mut inner = self.lock();
        inner.seen.retain(|_, deadline| *deadline > now);
        inner
            .seen
            .insert(seen_key(player, match_id), now + DEDUP_RETENTION);
        Ok(())
    }
}

#[async_trait]
impl PlayerListCache for MemoryCache {
    async fn cached_players(&self) -> Result<Option<Vec<TrackedPlayer>>, CacheError> {
        self.check()?;
        self.lock()
            .value(PLAYERS_KEY, Instant::now())
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(CacheError::from)
    }

    async fn players_generation(&self) -> Result<u64, CacheError> {
        self.check()?;
        Ok(self.lock().players_generation)
    }

    async fn store_players(
        &self,
        players: &[TrackedPlayer],
        generation: u64,
    ) -> Result<bool, CacheError> {
        self.check()?;
        let json = serde_json::to_string(players)?;
        let mut inner = self.lock();
        if inner.players_generation != generation {
            return Ok(false);
        }
        inner.set_value(PLAYERS_KEY.to_string(), json, PLAYER_LIST_TTL);
        Ok(true)
    }

    async fn invalidate_players(&self) -> Result<(), CacheError> {
        self.check()?;
        let mut inner = self.lock();
        inner.players_generation += 1;
        inner.values.remove(PLAYERS_KEY);
        Ok(())
    }
}

#[async_trait]
impl PuuidCache for MemoryCache {
    async fn cached_puuid(&self, player: &TrackedPlayer) -> Result<Option<String>, CacheError> {
        self.check()?;
        Ok(self.lock().value(&puuid_key(player), Instant::now()))
    }

    async fn store_puuid(&self, player: &TrackedPlayer, puuid: &str) -> Result<(), CacheError> {
        self.check()?;
        self.lock()
            .set_value(puuid_key(player), puuid.to_string(), PUUID_TTL);
        Ok(())
    }
}
