//! MatchWatcher processor.
//!
//! The MatchWatcher is responsible for:
//! - Listing tracked players through the [`PlayerDirectory`] on a fixed interval
//! - Resolving each player's PUUID (cache first, then the match source)
//! - Fetching recent match ids and dropping the ones already published
//! - Publishing a [`MatchEvent`] per new match, oldest first, and only then
//!   recording the match as seen
//!
//! Publishing before recording means a crash in between produces a
//! duplicate event, never a lost one. Errors for one player are counted and
//! logged without affecting the others; the next cycle retries them. A
//! broker failure stops the watcher.

use crate::broker::{BrokerError, Publisher, publish_json};
use crate::cache::{DedupStore, PuuidCache};
use crate::config::WatcherSettings;
use crate::sources::{MatchDetail, MatchSource, PlayerDirectory, SourceError};
use crate::utils::shutdown::wait_for_shutdown;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use zinger_sdk::client::ClientError;
use zinger_sdk::objects::{MatchEvent, MatchOutcome, QueueName, TrackedPlayer};

/// Errors that can occur while polling for matches.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The tracked-player list could not be loaded
    #[error("store error: {0}")]
    Store(#[from] ClientError),

    /// Match source error
    #[error("match source error: {0}")]
    Source(#[from] SourceError),

    /// The match detail has no entry for the player
    #[error("{player} is not a participant of match {match_id}")]
    MissingParticipant { player: String, match_id: String },

    /// Broker error
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Summary of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Players considered in this cycle.
    pub players: usize,
    /// Match events published.
    pub published: usize,
    /// Players whose polling failed.
    pub failed_players: usize,
}

/// Polls the match source and publishes new matches to `matches`.
pub struct MatchWatcher {
    directory: PlayerDirectory,
    source: Arc<dyn MatchSource>,
    dedup: Arc<dyn DedupStore>,
    puuids: Arc<dyn PuuidCache>,
    publisher: Arc<dyn Publisher>,
    settings: WatcherSettings,
    shutdown_rx: watch::Receiver<bool>,
}

impl MatchWatcher {
    /// Create a new MatchWatcher.
    ///
    /// # Arguments
    ///
    /// * `directory` - Read-through tracked-player list
    /// * `source` - Match-data source
    /// * `dedup` - Record of already published matches
    /// * `puuids` - PUUID cache
    /// * `publisher` - Broker handle for `matches`
    /// * `settings` - Polling interval and window
    /// * `shutdown_rx` - Receiver for shutdown signal
    pub fn new(
        directory: PlayerDirectory,
        source: Arc<dyn MatchSource>,
        dedup: Arc<dyn DedupStore>,
        puuids: Arc<dyn PuuidCache>,
        publisher: Arc<dyn Publisher>,
        settings: WatcherSettings,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            directory,
            source,
            dedup,
            puuids,
            publisher,
            settings,
            shutdown_rx,
        }
    }

    /// Run the MatchWatcher until shutdown or a broker failure.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            lookback_secs = self.settings.lookback.as_secs(),
            "MatchWatcher started"
        );

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut self.shutdown_rx) => {
                    info!("MatchWatcher received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {}
            }

            match self.poll_cycle().await {
                Ok(report) if report.players == 0 => {
                    warn!("No tracked players, waiting for next cycle");
                }
                Ok(report) => {
                    info!(
                        players = report.players,
                        published = report.published,
                        failed_players = report.failed_players,
                        "Polling cycle complete"
                    );
                }
                Err(WatchError::Broker(e)) => {
                    error!(error = %e, "Broker failure, stopping MatchWatcher");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "Polling cycle failed");
                }
            }
        }

        info!("MatchWatcher shutdown complete");
        Ok(())
    }

    /// Poll every tracked player once.
    ///
    /// Only a failure to list players or a broker failure is returned as an
    /// error; per-player failures are counted in the report.
    pub async fn poll_cycle(&self) -> Result<CycleReport, WatchError> {
        let players = self.directory.players().await?;
        let mut report = CycleReport {
            players: players.len(),
            ..Default::default()
        };
        let mut shutdown_rx = self.shutdown_rx.clone();

        for (i, player) in players.iter().enumerate() {
            if i > 0 && !self.settings.player_spacing.is_zero() {
                tokio::select! {
                    biased;

                    _ = wait_for_shutdown(&mut shutdown_rx) => {
                        debug!("Shutdown requested mid-cycle, skipping remaining players");
                        break;
                    }

                    _ = tokio::time::sleep(self.settings.player_spacing) => {}
                }
            }

            match self.poll_player(player).await {
                Ok(published) => report.published += published,
                Err(WatchError::Broker(e)) => return Err(WatchError::Broker(e)),
                Err(e) => {
                    report.failed_players += 1;
                    warn!(
                        player = %player.riot_id(),
                        guild_id = %player.summoner_guild_id,
                        error = %e,
                        "Failed to poll player"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Publish every unseen recent match of `player`. Returns the number of
    /// events published.
    async fn poll_player(&self, player: &TrackedPlayer) -> Result<usize, WatchError> {
        let puuid = self.puuid(player).await?;

        let lookback = i64::try_from(self.settings.lookback.as_secs()).unwrap_or(i64::MAX);
        let start_time = time::OffsetDateTime::now_utc()
            .unix_timestamp()
            .saturating_sub(lookback);
        let recent = self
            .source
            .recent_match_ids(&puuid, start_time, self.settings.max_matches)
            .await?;

        let unseen = match self.dedup.unseen(player, &recent).await {
            Ok(unseen) => unseen,
            Err(e) => {
                warn!(
                    player = %player.riot_id(),
                    error = %e,
                    "Dedup record unavailable, treating matches as new"
                );
                recent
            }
        };

        if unseen.is_empty() {
            debug!(player = %player.riot_id(), "No new matches");
            return Ok(0);
        }

        let mut published = 0;
        // The source lists newest first.
        for match_id in unseen.iter().rev() {
            let detail = self.source.match_detail(match_id).await?;
            let event = build_match_event(player, match_id, &detail, &puuid)?;

            publish_json(self.publisher.as_ref(), QueueName::Matches.as_str(), &event).await?;
            published += 1;
            info!(
                player = %player.riot_id(),
                guild_id = %player.summoner_guild_id,
                match_id = %match_id,
                placement = ?event.outcome.placement,
                "Published match event"
            );

            if let Err(e) = self.dedup.mark_seen(player, match_id).await {
                warn!(
                    player = %player.riot_id(),
                    match_id = %match_id,
                    error = %e,
                    "Failed to record match as seen, it may be published again"
                );
            }
        }

        Ok(published)
    }

    async fn puuid(&self, player: &TrackedPlayer) -> Result<String, WatchError> {
        match self.puuids.cached_puuid(player).await {
            Ok(Some(puuid)) => return Ok(puuid),
            Ok(None) => {}
            Err(e) => warn!(player = %player.riot_id(), error = %e, "PUUID cache unavailable"),
        }

        let puuid = self
            .source
            .resolve_puuid(&player.summoner_name, &player.summoner_tagline)
            .await?;
        if let Err(e) = self.puuids.store_puuid(player, &puuid).await {
            warn!(player = %player.riot_id(), error = %e, "Failed to cache PUUID");
        }
        Ok(puuid)
    }
}

/// Strip the set prefix from a trait or unit id (`TFT9_Kassadin` ->
/// `Kassadin`, `Set9_Void` -> `Void`).
fn display_name(id: &str) -> &str {
    match id.split_once('_') {
        Some((prefix, rest))
            if !rest.is_empty() && (prefix.starts_with("TFT") || prefix.starts_with("Set")) =>
        {
            rest
        }
        _ => id,
    }
}

/// Build the event for `player`'s entry in `detail`.
pub fn build_match_event(
    player: &TrackedPlayer,
    match_id: &str,
    detail: &MatchDetail,
    puuid: &str,
) -> Result<MatchEvent, WatchError> {
    let participant = detail
        .participant(puuid)
        .ok_or_else(|| WatchError::MissingParticipant {
            player: player.riot_id(),
            match_id: match_id.to_string(),
        })?;

    let mut active: Vec<_> = participant
        .traits
        .iter()
        .filter(|t| t.tier_current > 0)
        .collect();
    active.sort_by(|a, b| {
        b.tier_current
            .cmp(&a.tier_current)
            .then(b.num_units.cmp(&a.num_units))
    });

    let units = participant
        .units
        .iter()
        .map(|u| match u.tier {
            0 | 1 => display_name(&u.character_id).to_string(),
            stars => format!("{} {}-star", display_name(&u.character_id), stars),
        })
        .collect();

    let game_length = detail.info.game_length;
    let game_length_secs = (game_length.is_finite() && game_length > 0.0)
        .then(|| game_length.round() as u32);

    Ok(MatchEvent {
        match_id: match_id.to_string(),
        guild_id: player.summoner_guild_id.clone(),
        summoner_name: player.summoner_name.clone(),
        summoner_tagline: player.summoner_tagline.clone(),
        outcome: MatchOutcome {
            placement: participant.placement,
            level: participant.level,
            last_round: participant.last_round,
            traits: active
                .iter()
                .map(|t| display_name(&t.name).to_string())
                .collect(),
            units,
            game_length_secs,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::cache::MemoryCache;
    use crate::sources::{MatchInfo, MatchMetadata, Participant, PlayerSource, TraitEntry, UnitEntry};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedPlayers(Vec<TrackedPlayer>);

    #[async_trait]
    impl PlayerSource for FixedPlayers {
        async fn fetch_players(&self) -> Result<Vec<TrackedPlayer>, ClientError> {
            Ok(self.0.clone())
        }
    }

    /// Match source with one PUUID per player name and canned matches.
    #[derive(Default)]
    struct FakeSource {
        matches: HashMap<String, Vec<String>>,
        failing: Vec<String>,
        resolved: Mutex<usize>,
    }

    impl FakeSource {
        fn with_matches(mut self, name: &str, ids: &[&str]) -> Self {
            self.matches.insert(
                format!("puuid-{name}"),
                ids.iter().map(|s| s.to_string()).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl MatchSource for FakeSource {
        async fn resolve_puuid(&self, name: &str, _tagline: &str) -> Result<String, SourceError> {
            if self.failing.iter().any(|f| f == name) {
                return Err(SourceError::Api {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            *self.resolved.lock().unwrap() += 1;
            Ok(format!("puuid-{name}"))
        }

        async fn recent_match_ids(
            &self,
            puuid: &str,
            _start_time: i64,
            count: u32,
        ) -> Result<Vec<String>, SourceError> {
            let mut ids = self.matches.get(puuid).cloned().unwrap_or_default();
            ids.truncate(count as usize);
            Ok(ids)
        }

        async fn match_detail(&self, match_id: &str) -> Result<MatchDetail, SourceError> {
            let participants = self
                .matches
                .iter()
                .filter(|(_, ids)| ids.iter().any(|id| id == match_id))
                .map(|(puuid, _)| Participant {
                    puuid: puuid.clone(),
                    placement: Some(4),
                    ..Default::default()
                })
                .collect();
            Ok(MatchDetail {
                metadata: MatchMetadata {
                    match_id: match_id.to_string(),
                },
                info: MatchInfo {
                    game_length: 1800.0,
                    participants,
                },
            })
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(&self, _queue: &str, _payload: Vec<u8>) -> Result<(), BrokerError> {
            Err(BrokerError::TimedOut(Duration::from_secs(1)))
        }
    }

    fn settings() -> WatcherSettings {
        WatcherSettings {
            player_spacing: Duration::ZERO,
            ..Default::default()
        }
    }

    fn watcher(
        players: Vec<TrackedPlayer>,
        source: FakeSource,
        cache: &MemoryCache,
        publisher: Arc<dyn Publisher>,
    ) -> (MatchWatcher, watch::Sender<bool>) {
        spaced_watcher(players, source, cache, publisher, Duration::ZERO)
    }

    fn spaced_watcher(
        players: Vec<TrackedPlayer>,
        source: FakeSource,
        cache: &MemoryCache,
        publisher: Arc<dyn Publisher>,
        player_spacing: Duration,
    ) -> (MatchWatcher, watch::Sender<bool>) {
        let cache = Arc::new(cache.clone());
        let directory = PlayerDirectory::new(Arc::new(FixedPlayers(players)), cache.clone());
        let (tx, rx) = watch::channel(false);
        let watcher = MatchWatcher::new(
            directory,
            Arc::new(source),
            cache.clone(),
            cache,
            publisher,
            WatcherSettings {
                player_spacing,
                ..settings()
            },
            rx,
        );
        (watcher, tx)
    }

    #[tokio::test]
    async fn publishes_new_matches_oldest_first_and_once() {
        let broker = MemoryBroker::new();
        let cache = MemoryCache::new();
        let player = TrackedPlayer::new("Foo", "NA1", "123");
        let source = FakeSource::default().with_matches("Foo", &["NA1_3", "NA1_2", "NA1_1"]);
        let (watcher, _shutdown) =
            watcher(vec![player.clone()], source, &cache, Arc::new(broker.clone()));

        let report = watcher.poll_cycle().await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                players: 1,
                published: 3,
                failed_players: 0
            }
        );
        let events: Vec<MatchEvent> = broker.drain_json("matches").unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.match_id.as_str()).collect();
        assert_eq!(ids, vec!["NA1_1", "NA1_2", "NA1_3"]);
        assert!(events.iter().all(|e| e.guild_id == "123"));
        assert!(cache.is_seen(&player, "NA1_3"));

        let report = watcher.poll_cycle().await.unwrap();
        assert_eq!(report.published, 0);
        assert!(broker.is_empty("matches"));
    }

    #[tokio::test]
    async fn failed_mark_seen_republishes_next_cycle() {
        let broker = MemoryBroker::new();
        let cache = MemoryCache::new();
        cache.set_unavailable(true);
        let source = FakeSource::default().with_matches("Foo", &["NA1_1"]);
        let (watcher, _shutdown) = watcher(
            vec![TrackedPlayer::new("Foo", "NA1", "123")],
            source,
            &cache,
            Arc::new(broker.clone()),
        );

        assert_eq!(watcher.poll_cycle().await.unwrap().published, 1);
        assert_eq!(watcher.poll_cycle().await.unwrap().published, 1);

        let events: Vec<MatchEvent> = broker.drain_json("matches").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], events[1]);
    }

    #[tokio::test]
    async fn one_failing_player_does_not_abort_the_cycle() {
        let broker = MemoryBroker::new();
        let cache = MemoryCache::new();
        let mut source = FakeSource::default()
            .with_matches("Foo", &["NA1_1"])
            .with_matches("Bar", &["NA1_2"]);
        source.failing.push("Foo".into());
        let (watcher, _shutdown) = watcher(
            vec![
                TrackedPlayer::new("Foo", "NA1", "1"),
                TrackedPlayer::new("Bar", "NA1", "1"),
            ],
            source,
            &cache,
            Arc::new(broker.clone()),
        );

        let report = watcher.poll_cycle().await.unwrap();
        assert_eq!(report.failed_players, 1);
        assert_eq!(report.published, 1);
        let events: Vec<MatchEvent> = broker.drain_json("matches").unwrap();
        assert_eq!(events[0].summoner_name, "Bar");
    }

    #[tokio::test]
    async fn same_player_in_two_guilds_is_announced_in_both() {
        let broker = MemoryBroker::new();
        let cache = MemoryCache::new();
        let source = FakeSource::default().with_matches("Foo", &["NA1_1"]);
        let (watcher, _shutdown) = watcher(
            vec![
                TrackedPlayer::new("Foo", "NA1", "1"),
                TrackedPlayer::new("Foo", "NA1", "2"),
            ],
            source,
            &cache,
            Arc::new(broker.clone()),
        );

        assert_eq!(watcher.poll_cycle().await.unwrap().published, 2);
        let events: Vec<MatchEvent> = broker.drain_json("matches").unwrap();
        let guilds: Vec<_> = events.iter().map(|e| e.guild_id.as_str()).collect();
        assert_eq!(guilds, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn puuid_is_resolved_once_while_cached() {
        let broker = MemoryBroker::new();
        let cache = MemoryCache::new();
        let source = Arc::new(FakeSource::default());
        let cache_arc = Arc::new(cache.clone());
        let directory = PlayerDirectory::new(
            Arc::new(FixedPlayers(vec![TrackedPlayer::new("Foo", "NA1", "1")])),
            cache_arc.clone(),
        );
        let (_tx, rx) = watch::channel(false);
        let watcher = MatchWatcher::new(
            directory,
            source.clone(),
            cache_arc.clone(),
            cache_arc,
            Arc::new(broker),
            settings(),
            rx,
        );

        watcher.poll_cycle().await.unwrap();
        watcher.poll_cycle().await.unwrap();
        assert_eq!(*source.resolved.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn broker_failure_fails_the_cycle_without_marking() {
        let cache = MemoryCache::new();
        let player = TrackedPlayer::new("Foo", "NA1", "1");
        let source = FakeSource::default().with_matches("Foo", &["NA1_1"]);
        let (watcher, _shutdown) =
            watcher(vec![player.clone()], source, &cache, Arc::new(FailingPublisher));

        let err = watcher.poll_cycle().await.unwrap_err();
        assert!(matches!(err, WatchError::Broker(_)));
        assert!(!cache.is_seen(&player, "NA1_1"));
    }

    fn three_players() -> (Vec<TrackedPlayer>, FakeSource) {
        let players = vec![
            TrackedPlayer::new("Foo", "NA1", "1"),
            TrackedPlayer::new("Bar", "NA1", "1"),
            TrackedPlayer::new("Baz", "NA1", "1"),
        ];
        let source = FakeSource::default()
            .with_matches("Foo", &["NA1_1"])
            .with_matches("Bar", &["NA1_2"])
            .with_matches("Baz", &["NA1_3"]);
        (players, source)
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_players_are_all_polled() {
        let broker = MemoryBroker::new();
        let cache = MemoryCache::new();
        let (players, source) = three_players();
        let (watcher, _shutdown) = spaced_watcher(
            players,
            source,
            &cache,
            Arc::new(broker.clone()),
            Duration::from_secs(1),
        );

        let started = tokio::time::Instant::now();
        let report = watcher.poll_cycle().await.unwrap();
        assert_eq!(report.published, 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(broker.len("matches"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_cycle_skips_remaining_players() {
        let broker = MemoryBroker::new();
        let cache = MemoryCache::new();
        let (players, source) = three_players();
        let (watcher, shutdown) = spaced_watcher(
            players,
            source,
            &cache,
            Arc::new(broker.clone()),
            Duration::from_secs(1),
        );
        shutdown.send(true).unwrap();

        let report = watcher.poll_cycle().await.unwrap();
        assert_eq!(report.players, 3);
        assert_eq!(report.published, 1);
        let events: Vec<MatchEvent> = broker.drain_json("matches").unwrap();
        assert_eq!(events[0].summoner_name, "Foo");
    }

    #[test]
    fn builds_event_from_participant_entry() {
        let player = TrackedPlayer::new("Foo", "NA1", "123");
        let detail = MatchDetail {
            metadata: MatchMetadata {
                match_id: "NA1_9".into(),
            },
            info: MatchInfo {
                game_length: 1834.6,
                participants: vec![Participant {
                    puuid: "p".into(),
                    placement: Some(8),
                    level: Some(7),
                    last_round: Some(24),
                    traits: vec![
                        TraitEntry {
                            name: "Set9_Void".into(),
                            num_units: 2,
                            tier_current: 1,
                        },
                        TraitEntry {
                            name: "Set9_Sorcerer".into(),
                            num_units: 4,
                            tier_current: 2,
                        },
                        TraitEntry {
                            name: "Set9_Bastion".into(),
                            num_units: 1,
                            tier_current: 0,
                        },
                    ],
                    units: vec![
                        UnitEntry {
                            character_id: "TFT9_Kassadin".into(),
                            tier: 2,
                        },
                        UnitEntry {
                            character_id: "TFT9_Cassiopeia".into(),
                            tier: 1,
                        },
                    ],
                }],
            },
        };

        let event = build_match_event(&player, "NA1_9", &detail, "p").unwrap();
        assert_eq!(event.guild_id, "123");
        assert_eq!(event.outcome.placement, Some(8));
        assert_eq!(event.outcome.traits, vec!["Sorcerer", "Void"]);
        assert_eq!(event.outcome.units, vec!["Kassadin 2-star", "Cassiopeia"]);
        assert_eq!(event.outcome.game_length_secs, Some(1835));

        let err = build_match_event(&player, "NA1_9", &detail, "other").unwrap_err();
        assert!(matches!(err, WatchError::MissingParticipant { .. }));
    }
}
