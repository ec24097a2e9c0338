//! Tracked-player list as seen by the match watcher.

use crate::cache::PlayerListCache;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};
use zinger_sdk::client::{ClientError, StoreClient};
use zinger_sdk::objects::TrackedPlayer;

/// Authoritative source of tracked players.
#[async_trait]
pub trait PlayerSource: Send + Sync {
    async fn fetch_players(&self) -> Result<Vec<TrackedPlayer>, ClientError>;
}

#[async_trait]
impl PlayerSource for StoreClient {
    async fn fetch_players(&self) -> Result<Vec<TrackedPlayer>, ClientError> {
        self.list_players().await
    }
}

/// Read-through view of the tracked-player list.
///
/// Serves the cached list while it lives; otherwise asks the store and
/// refills the cache. Cache failures are logged and bypassed.
#[derive(Clone)]
pub struct PlayerDirectory {
    source: Arc<dyn PlayerSource>,
    cache: Option<Arc<dyn PlayerListCache>>,
}

impl PlayerDirectory {
    pub fn new(source: Arc<dyn PlayerSource>, cache: Arc<dyn PlayerListCache>) -> Self {
        Self {
            source,
            cache: Some(cache),
        }
    }

    /// Ask the store on every call. Used when the cache is process-local
    /// and would not see the store's invalidations.
    pub fn uncached(source: Arc<dyn PlayerSource>) -> Self {
        Self {
            source,
            cache: None,
        }
    }

    pub async fn players(&self) -> Result<Vec<TrackedPlayer>, ClientError> {
        let Some(cache) = &self.cache else {
            return self.source.fetch_players().await;
        };

        let generation = match cache.cached_players().await {
            Ok(Some(players)) if !players.is_empty() => {
                debug!(count = players.len(), "Using cached player list");
                return Ok(players);
            }
            Ok(_) => cache
                .players_generation()
                .await
                .inspect_err(|e| warn!(error = %e, "Failed to read player list generation"))
                .ok(),
            Err(e) => {
                warn!(error = %e, "Player list cache unavailable, asking the store");
                None
            }
        };

        let players = self.source.fetch_players().await?;
        if let Some(generation) = generation {
            if let Err(e) = cache.store_players(&players, generation).await {
                warn!(error = %e, "Failed to cache player list");
            }
        }
        debug!(count = players.len(), "Fetched player list from the store");
        Ok(players)
    }
}
