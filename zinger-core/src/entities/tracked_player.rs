use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use zinger_sdk::objects::TrackedPlayer;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TrackedPlayerRecord {
    pub id: i64,
    pub summoner_name: String,
    pub summoner_tagline: String,
    pub guild_id: String,
    pub created_at: time::PrimitiveDateTime,
}

impl From<TrackedPlayerRecord> for TrackedPlayer {
    fn from(record: TrackedPlayerRecord) -> Self {
        TrackedPlayer::new(record.summoner_name, record.summoner_tagline, record.guild_id)
    }
}

#[derive(Debug, Clone, Copy)]
/// Create the `tracked_players` table if it does not exist yet.
///
/// Mirrors the first migration so the store can start against an empty
/// database without `--migrate`.
pub struct EnsureTrackedPlayersTable;

impl Processor<EnsureTrackedPlayersTable> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:EnsureTrackedPlayersTable")]
    async fn process(&self, _: EnsureTrackedPlayersTable) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(include_str!("../../../migrations/0001_tracked_players.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Insert a tracked player.
///
/// Uses ON CONFLICT DO NOTHING; the output is whether a row was inserted.
pub struct InsertTrackedPlayer {
    pub summoner_name: String,
    pub summoner_tagline: String,
    pub guild_id: String,
}

impl Processor<InsertTrackedPlayer> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertTrackedPlayer")]
    async fn process(&self, insert: InsertTrackedPlayer) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO tracked_players (summoner_name, summoner_tagline, guild_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (guild_id, summoner_name, summoner_tagline) DO NOTHING
            "#,
        )
        .bind(insert.summoner_name)
        .bind(insert.summoner_tagline)
        .bind(insert.guild_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone, Copy)]
/// List every tracked player, oldest first.
pub struct ListTrackedPlayers;

impl Processor<ListTrackedPlayers> for DatabaseProcessor {
    type Output = Vec<TrackedPlayerRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListTrackedPlayers")]
    async fn process(&self, _: ListTrackedPlayers) -> Result<Vec<TrackedPlayerRecord>, sqlx::Error> {
        sqlx::query_as::<_, TrackedPlayerRecord>(
            r#"
            SELECT id, summoner_name, summoner_tagline, guild_id, created_at
            FROM tracked_players
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Set guild and tagline of every player with the given name.
///
/// Returns the number of rows updated.
pub struct UpdateTrackedPlayerByName {
    pub summoner_name: String,
    pub summoner_tagline: String,
    pub guild_id: String,
}

impl Processor<UpdateTrackedPlayerByName> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateTrackedPlayerByName")]
    async fn process(&self, update: UpdateTrackedPlayerByName) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_players
            SET summoner_tagline = $2, guild_id = $3
            WHERE summoner_name = $1
            "#,
        )
        .bind(update.summoner_name)
        .bind(update.summoner_tagline)
        .bind(update.guild_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Errors returned by a [`PlayerRepository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The player is already tracked in that guild
    #[error("player is already tracked in this guild")]
    Conflict,
}

/// Storage of tracked players as used by the store API.
#[async_trait]
pub trait PlayerRepository: Send + Sync {
    /// Track a new player. Fails with [`RepositoryError::Conflict`] if the
    /// player is already tracked in that guild.
    async fn add(&self, player: &TrackedPlayer) -> Result<(), RepositoryError>;

    async fn list(&self) -> Result<Vec<TrackedPlayer>, RepositoryError>;

    /// Move every player named `player.summoner_name` to the given guild and
    /// tagline. Returns how many players were updated.
    async fn update_by_name(&self, player: &TrackedPlayer) -> Result<u64, RepositoryError>;
}

fn unique_violation(e: sqlx::Error) -> RepositoryError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => RepositoryError::Conflict,
        _ => RepositoryError::Database(e),
    }
}

#[async_trait]
impl PlayerRepository for DatabaseProcessor {
    async fn add(&self, player: &TrackedPlayer) -> Result<(), RepositoryError> {
        let inserted = self
            .process(InsertTrackedPlayer {
                summoner_name: player.summoner_name.clone(),
                summoner_tagline: player.summoner_tagline.clone(),
                guild_id: player.summoner_guild_id.clone(),
            })
            .await?;
        if inserted {
            Ok(())
        } else {
            Err(RepositoryError::Conflict)
        }
    }

    async fn list(&self) -> Result<Vec<TrackedPlayer>, RepositoryError> {
        let records = self.process(ListTrackedPlayers).await?;
        Ok(records.into_iter().map(TrackedPlayer::from).collect())
    }

    async fn update_by_name(&self, player: &TrackedPlayer) -> Result<u64, RepositoryError> {
        self.process(UpdateTrackedPlayerByName {
            summoner_name: player.summoner_name.clone(),
            summoner_tagline: player.summoner_tagline.clone(),
            guild_id: player.summoner_guild_id.clone(),
        })
        .await
        .map_err(unique_violation)
    }
}

/// In-process [`PlayerRepository`] with the same uniqueness rules as the
/// `tracked_players` table.
#[derive(Debug, Default)]
pub struct MemoryPlayerRepository {
    players: Mutex<Vec<TrackedPlayer>>,
}

impl MemoryPlayerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_players(players: Vec<TrackedPlayer>) -> Self {
        Self {
            players: Mutex::new(players),
        }
    }
}

#[async_trait]
impl PlayerRepository for MemoryPlayerRepository {
    async fn add(&self, player: &TrackedPlayer) -> Result<(), RepositoryError> {
        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        if players.contains(player) {
            return Err(RepositoryError::Conflict);
        }
        players.push(player.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TrackedPlayer>, RepositoryError> {
        Ok(self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn update_by_name(&self, player: &TrackedPlayer) -> Result<u64, RepositoryError> {
        let mut players = self.players.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = players.clone();
        let mut count = 0;
        for existing in updated
            .iter_mut()
            .filter(|p| p.summoner_name == player.summoner_name)
        {
            existing.summoner_tagline = player.summoner_tagline.clone();
            existing.summoner_guild_id = player.summoner_guild_id.clone();
            count += 1;
        }

        let unique: HashSet<&TrackedPlayer> = updated.iter().collect();
        if unique.len() != updated.len() {
            return Err(RepositoryError::Conflict);
        }
        *players = updated;
        Ok(count)
    }
}
