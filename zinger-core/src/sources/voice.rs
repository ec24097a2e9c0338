//! Voice sessions and the per-guild session registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::process::Command;

/// Errors that can occur while playing a clip.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Player program could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// Player program exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    /// I/O error while waiting for the player
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An active voice connection in one guild.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    /// Play the audio file at `path`, returning once playback has ended.
    ///
    /// Callers bound playback with their own deadline by dropping the
    /// future; implementations must stop playing when dropped.
    async fn play(&self, path: &Path) -> Result<(), PlaybackError>;
}

/// Active voice sessions keyed by guild id.
///
/// A chat front end registers a session when it joins a voice channel and
/// unregisters it on leave. A fallback session, when set, serves every guild
/// without its own registration.
#[derive(Default)]
pub struct VoiceSessions {
    sessions: RwLock<HashMap<String, Arc<dyn VoiceSession>>>,
    fallback: Option<Arc<dyn VoiceSession>>,
}

impl VoiceSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that answers every guild with `session`.
    pub fn with_fallback(session: Arc<dyn VoiceSession>) -> Self {
        Self {
            sessions: RwLock::default(),
            fallback: Some(session),
        }
    }

    pub fn register(&self, guild_id: impl Into<String>, session: Arc<dyn VoiceSession>) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild_id.into(), session);
    }

    pub fn unregister(&self, guild_id: &str) -> Option<Arc<dyn VoiceSession>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(guild_id)
    }

    /// The session for `guild_id`, if the guild has one.
    pub fn get(&self, guild_id: &str) -> Option<Arc<dyn VoiceSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(guild_id)
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}

impl std::fmt::Debug for VoiceSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guilds: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("VoiceSessions")
            .field("guilds", &guilds)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Plays clips with a local player binary (`ffplay` or compatible), invoked
/// as `<program> -nodisp -autoexit -loglevel error <file>`. The player is
/// killed if the `play` future is dropped.
#[derive(Debug, Clone)]
pub struct CommandVoiceSession {
    program: PathBuf,
}

impl CommandVoiceSession {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl VoiceSession for CommandVoiceSession {
    async fn play(&self, path: &Path) -> Result<(), PlaybackError> {
        let program = self.program.display().to_string();
        let child = Command::new(&self.program)
            .args(["-nodisp", "-autoexit", "-loglevel", "error"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlaybackError::Spawn {
                program: program.clone(),
                source,
            })?;

        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(PlaybackError::Exit {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
