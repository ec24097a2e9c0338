//! Application state shared across all request handlers.

use std::sync::Arc;
use zinger_core::cache::PlayerListCache;
use zinger_core::entities::PlayerRepository;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Tracked-player storage.
    pub players: Arc<dyn PlayerRepository>,
    /// Cached copy of the player list, invalidated on every write.
    pub cache: Arc<dyn PlayerListCache>,
}

impl AppState {
    pub fn new(players: Arc<dyn PlayerRepository>, cache: Arc<dyn PlayerListCache>) -> Self {
        Self { players, cache }
    }
}
