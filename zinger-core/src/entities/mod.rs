pub mod tracked_player;

pub use tracked_player::{
    MemoryPlayerRepository, PlayerRepository, RepositoryError, TrackedPlayerRecord,
};
