//! AudioDispatcher stage: `audio_queue` -> voice sessions.
//!
//! The dispatcher:
//! - Resolves each clip's guild to a voice session, dropping clips for guilds
//!   without one
//! - Hands clips to a per-guild playback task over a bounded channel
//! - Deletes every clip once its playback is over, whatever the outcome
//!
//! A guild's clips play in the order they were consumed. Guilds play
//! independently of each other.

use super::speech_synthesizer::{CLIP_PREFIX, remove_file_quietly};
use super::worker::{Stage, StageError};
use crate::events::{PlaybackRequest, PlaybackRequestReceiver, PlaybackRequestSender, playback_channel};
use crate::sources::VoiceSessions;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use zinger_sdk::objects::{AudioReadyMessage, QueueName};

/// Plays finished clips in the voice session of their guild.
pub struct AudioDispatcher {
    sessions: Arc<VoiceSessions>,
    audio_dir: PathBuf,
    playback_timeout: Duration,
    queues: Mutex<HashMap<String, PlaybackRequestSender>>,
    players: Mutex<JoinSet<()>>,
}

impl AudioDispatcher {
    pub fn new(
        sessions: Arc<VoiceSessions>,
        audio_dir: impl Into<PathBuf>,
        playback_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            audio_dir: audio_dir.into(),
            playback_timeout,
            queues: Mutex::default(),
            players: Mutex::default(),
        }
    }

    /// Delete `tts_*` clips in the audio directory last modified at least
    /// `max_age` ago. Clips acked but never played, for instance because the
    /// process died mid-queue, are otherwise never cleaned up.
    ///
    /// Returns how many files were removed. A missing directory has none.
    pub async fn sweep_stale(&self, max_age: Duration) -> std::io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.audio_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_name().to_string_lossy().starts_with(CLIP_PREFIX) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let stale = metadata.is_file()
                && metadata
                    .modified()?
                    .elapsed()
                    .is_ok_and(|age| age >= max_age);
            if stale {
                remove_file_quietly(&entry.path()).await;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, audio_dir = %self.audio_dir.display(), "Swept stale clips");
        }
        Ok(removed)
    }

    /// Whether `path` names a file directly inside the audio directory.
    fn owns(&self, path: &Path) -> bool {
        path.file_name().is_some() && path.parent() == Some(self.audio_dir.as_path())
    }

    /// Sender for the guild's playback queue, starting its task if needed.
    fn queue_for(&self, guild_id: &str) -> PlaybackRequestSender {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = queues.get(guild_id).filter(|tx| !tx.is_closed()) {
            return tx.clone();
        }

        let (tx, rx) = playback_channel();
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(play_queue(
                guild_id.to_string(),
                self.sessions.clone(),
                rx,
                self.playback_timeout,
            ));
        queues.insert(guild_id.to_string(), tx.clone());
        debug!(guild_id, "Started playback queue");
        tx
    }
}

#[async_trait]
impl Stage for AudioDispatcher {
    type Input = AudioReadyMessage;

    fn queue(&self) -> QueueName {
        QueueName::AudioQueue
    }

    async fn handle(&self, message: &AudioReadyMessage) -> Result<(), StageError> {
        let path = PathBuf::from(&message.path);
        if !self.owns(&path) {
            return Err(StageError::Rejected(format!(
                "{} is outside the audio directory {}",
                message.path,
                self.audio_dir.display()
            )));
        }

        if self.sessions.get(&message.guild_id).is_none() {
            info!(
                guild_id = %message.guild_id,
                filename = %message.filename,
                "No voice session for guild, dropping clip"
            );
            remove_file_quietly(&path).await;
            return Ok(());
        }

        let request = PlaybackRequest {
            guild_id: message.guild_id.clone(),
            filename: message.filename.clone(),
            path,
        };
        if let Err(e) = self.queue_for(&message.guild_id).send(request).await {
            self.queues
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&message.guild_id);
            return Err(StageError::Failed(format!(
                "playback queue for guild {} is gone: {e}",
                message.guild_id
            )));
        }

        debug!(guild_id = %message.guild_id, filename = %message.filename, "Queued clip");
        Ok(())
    }

    /// Close every guild queue and wait for queued clips to play out.
    async fn finish(&self) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let mut players = std::mem::take(
            &mut *self.players.lock().unwrap_or_else(PoisonError::into_inner),
        );

        while let Some(joined) = players.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Playback task failed");
            }
        }
        info!("Playback queues drained");
    }
}

async fn play_queue(
    guild_id: String,
    sessions: Arc<VoiceSessions>,
    mut rx: PlaybackRequestReceiver,
    playback_timeout: Duration,
) {
    while let Some(request) = rx.recv().await {
        // The session may have gone away while the clip waited.
        match sessions.get(&guild_id) {
            Some(session) => {
                match tokio::time::timeout(playback_timeout, session.play(&request.path)).await {
                    Ok(Ok(())) => {
                        info!(guild_id = %guild_id, filename = %request.filename, "Played clip")
                    }
                    Ok(Err(e)) => warn!(
                        guild_id = %guild_id,
                        filename = %request.filename,
                        error = %e,
                        "Playback failed"
                    ),
                    Err(_) => warn!(
                        guild_id = %guild_id,
                        filename = %request.filename,
                        timeout = ?playback_timeout,
                        "Playback timed out"
                    ),
                }
            }
            None => info!(
                guild_id = %guild_id,
                filename = %request.filename,
                "Voice session closed, skipping clip"
            ),
        }
        remove_file_quietly(&request.path).await;
    }
    debug!(guild_id = %guild_id, "Playback queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{PlaybackError, VoiceSession};
    use tokio::sync::Notify;

    type PlayLog = Arc<Mutex<Vec<(String, String, bool)>>>;

    /// Records `(label, file name, file existed)` for every clip played.
    struct RecordingSession {
        label: &'static str,
        log: PlayLog,
        gate: Option<Arc<Notify>>,
        started: Option<Arc<Notify>>,
        delay: Duration,
        fail: bool,
    }

    impl RecordingSession {
        fn new(label: &'static str, log: &PlayLog) -> Self {
            Self {
                label,
                log: log.clone(),
                gate: None,
                started: None,
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl VoiceSession for RecordingSession {
        async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
            if let Some(started) = &self.started {
                started.notify_one();
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            tokio::time::sleep(self.delay).await;
            self.log.lock().unwrap().push((
                self.label.to_string(),
                path.file_name().unwrap().to_string_lossy().into_owned(),
                path.exists(),
            ));
            if self.fail {
                return Err(PlaybackError::Io(std::io::Error::other("device lost")));
            }
            Ok(())
        }
    }

    fn clip(dir: &Path, name: &str, guild_id: &str) -> AudioReadyMessage {
        let path = dir.join(format!("{name}.opus"));
        std::fs::write(&path, b"opus").unwrap();
        AudioReadyMessage {
            filename: name.into(),
            path: path.to_string_lossy().into_owned(),
            guild_id: guild_id.into(),
        }
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn plays_a_guild_in_order_and_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = PlayLog::default();
        let sessions = Arc::new(VoiceSessions::new());
        sessions.register(
            "1",
            Arc::new(RecordingSession {
                delay: Duration::from_millis(5),
                ..RecordingSession::new("g1", &log)
            }),
        );
        let dispatcher = AudioDispatcher::new(sessions, dir.path(), TIMEOUT);

        for name in ["tts_a", "tts_b", "tts_c"] {
            dispatcher.handle(&clip(dir.path(), name, "1")).await.unwrap();
        }
        dispatcher.finish().await;

        let played: Vec<_> = log.lock().unwrap().clone();
        assert_eq!(
            played,
            vec![
                ("g1".into(), "tts_a.opus".into(), true),
                ("g1".into(), "tts_b.opus".into(), true),
                ("g1".into(), "tts_c.opus".into(), true),
            ]
        );
        assert!(is_empty(dir.path()));
    }

    #[tokio::test]
    async fn guilds_play_independently() {
        let dir = tempfile::tempdir().unwrap();
        let log = PlayLog::default();
        let gate = Arc::new(Notify::new());
        let sessions = Arc::new(VoiceSessions::new());
        sessions.register(
            "1",
            Arc::new(RecordingSession {
                gate: Some(gate.clone()),
                ..RecordingSession::new("g1", &log)
            }),
        );
        sessions.register("2", Arc::new(RecordingSession::new("g2", &log)));
        let dispatcher = AudioDispatcher::new(sessions, dir.path(), TIMEOUT);

        dispatcher.handle(&clip(dir.path(), "tts_slow", "1")).await.unwrap();
        dispatcher.handle(&clip(dir.path(), "tts_fast", "2")).await.unwrap();

        tokio::time::timeout(TIMEOUT, async {
            while log.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(log.lock().unwrap()[0].0, "g2");

        gate.notify_one();
        dispatcher.finish().await;
        assert_eq!(log.lock().unwrap().len(), 2);
        assert!(is_empty(dir.path()));
    }

    #[tokio::test]
    async fn drops_clip_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AudioDispatcher::new(Arc::new(VoiceSessions::new()), dir.path(), TIMEOUT);

        dispatcher.handle(&clip(dir.path(), "tts_a", "9")).await.unwrap();

        assert!(is_empty(dir.path()));
        dispatcher.finish().await;
    }

    #[tokio::test]
    async fn rejects_paths_outside_audio_dir() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let log = PlayLog::default();
        let dispatcher = AudioDispatcher::new(
            Arc::new(VoiceSessions::with_fallback(Arc::new(RecordingSession::new(
                "any", &log,
            )))),
            dir.path(),
            TIMEOUT,
        );

        let foreign = clip(elsewhere.path(), "tts_a", "1");
        let err = dispatcher.handle(&foreign).await.unwrap_err();
        assert!(matches!(err, StageError::Rejected(_)));
        assert!(Path::new(&foreign.path).exists());

        let mut sneaky = clip(dir.path(), "tts_b", "1");
        sneaky.path = dir.path().join("..").to_string_lossy().into_owned();
        let err = dispatcher.handle(&sneaky).await.unwrap_err();
        assert!(matches!(err, StageError::Rejected(_)));

        dispatcher.finish().await;
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deletes_file_after_failed_or_expired_playback() {
        let dir = tempfile::tempdir().unwrap();
        let log = PlayLog::default();
        let sessions = Arc::new(VoiceSessions::new());
        sessions.register(
            "1",
            Arc::new(RecordingSession {
                fail: true,
                ..RecordingSession::new("g1", &log)
            }),
        );
        sessions.register(
            "2",
            Arc::new(RecordingSession {
                delay: Duration::from_secs(30),
                ..RecordingSession::new("g2", &log)
            }),
        );
        let dispatcher =
            AudioDispatcher::new(sessions, dir.path(), Duration::from_millis(20));

        dispatcher.handle(&clip(dir.path(), "tts_a", "1")).await.unwrap();
        dispatcher.handle(&clip(dir.path(), "tts_b", "2")).await.unwrap();
        dispatcher.finish().await;

        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(is_empty(dir.path()));
    }

    #[tokio::test]
    async fn skips_clip_when_session_leaves_while_queued() {
        let dir = tempfile::tempdir().unwrap();
        let log = PlayLog::default();
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let sessions = Arc::new(VoiceSessions::new());
        sessions.register(
            "1",
            Arc::new(RecordingSession {
                gate: Some(gate.clone()),
                started: Some(started.clone()),
                ..RecordingSession::new("g1", &log)
            }),
        );
        let dispatcher = AudioDispatcher::new(sessions.clone(), dir.path(), TIMEOUT);

        dispatcher.handle(&clip(dir.path(), "tts_a", "1")).await.unwrap();
        dispatcher.handle(&clip(dir.path(), "tts_b", "1")).await.unwrap();
        tokio::time::timeout(TIMEOUT, started.notified()).await.unwrap();
        sessions.unregister("1");
        gate.notify_one();
        dispatcher.finish().await;

        let played: Vec<_> = log.lock().unwrap().iter().map(|p| p.1.clone()).collect();
        assert_eq!(played, vec!["tts_a.opus".to_string()]);
        assert!(is_empty(dir.path()));
    }

    #[tokio::test]
    async fn sweep_removes_only_old_clips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tts_old.opus"), b"opus").unwrap();
        std::fs::write(dir.path().join("tts_old.wav"), b"wav").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        let dispatcher = AudioDispatcher::new(Arc::new(VoiceSessions::new()), dir.path(), TIMEOUT);

        assert_eq!(dispatcher.sweep_stale(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(dispatcher.sweep_stale(Duration::ZERO).await.unwrap(), 2);

        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(left, vec!["notes.txt".to_string()]);
    }

    #[tokio::test]
    async fn sweep_of_missing_dir_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AudioDispatcher::new(
            Arc::new(VoiceSessions::new()),
            dir.path().join("absent"),
            TIMEOUT,
        );
        assert_eq!(dispatcher.sweep_stale(Duration::ZERO).await.unwrap(), 0);
    }
}
