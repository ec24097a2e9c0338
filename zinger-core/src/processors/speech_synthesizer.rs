//! SpeechSynthesizer stage: `zingers` -> `audio_queue`.
//!
//! Each message becomes a fresh `tts_<token>` pair of files in the audio
//! directory: the engine's raw output, removed once transcoding has run, and
//! the Opus file handed to the dispatcher. `<token>` is a UUIDv7, so a
//! redelivered message gets its own file. On any failure no file of the pair
//! is left behind.

use super::worker::{Stage, StageError};
use crate::broker::{Publisher, publish_json};
use crate::sources::{SpeechEngine, SpeechError, Transcoder};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zinger_sdk::objects::{AudioReadyMessage, CommentaryMessage, QueueName};

impl From<SpeechError> for StageError {
    fn from(e: SpeechError) -> Self {
        match e {
            SpeechError::TimedOut { timeout, .. } => StageError::TimedOut(timeout),
            SpeechError::BlankText => StageError::Rejected(e.to_string()),
            other => StageError::Failed(other.to_string()),
        }
    }
}

/// File name prefix of every clip written to the audio directory.
pub(crate) const CLIP_PREFIX: &str = "tts_";

/// Remove `path`, treating an already missing file as success.
pub(crate) async fn remove_file_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

/// Turns commentary into Opus clips in the shared audio directory.
pub struct SpeechSynthesizer {
    engine: Arc<dyn SpeechEngine>,
    transcoder: Arc<dyn Transcoder>,
    publisher: Arc<dyn Publisher>,
    audio_dir: PathBuf,
}

impl SpeechSynthesizer {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        transcoder: Arc<dyn Transcoder>,
        publisher: Arc<dyn Publisher>,
        audio_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            transcoder,
            publisher,
            audio_dir: audio_dir.into(),
        }
    }

    /// Create the audio directory if it does not exist.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.audio_dir).await
    }

    async fn render(&self, text: &str, raw: &Path, opus: &Path) -> Result<(), SpeechError> {
        self.engine.synthesize(text, raw).await?;
        self.transcoder.to_opus(raw, opus).await
    }
}

#[async_trait]
impl Stage for SpeechSynthesizer {
    type Input = CommentaryMessage;

    fn queue(&self) -> QueueName {
        QueueName::Zingers
    }

    async fn handle(&self, message: &CommentaryMessage) -> Result<(), StageError> {
        if message.text.trim().is_empty() {
            return Err(SpeechError::BlankText.into());
        }

        let filename = format!("{CLIP_PREFIX}{}", Uuid::now_v7().simple());
        let raw = self
            .audio_dir
            .join(format!("{filename}.{}", self.engine.extension()));
        let opus = self.audio_dir.join(format!("{filename}.opus"));

        let rendered = self.render(&message.text, &raw, &opus).await;
        remove_file_quietly(&raw).await;
        if let Err(e) = rendered {
            remove_file_quietly(&opus).await;
            return Err(e.into());
        }

        let ready = AudioReadyMessage {
            filename: filename.clone(),
            path: opus.to_string_lossy().into_owned(),
            guild_id: message.guild_id.clone(),
        };
        if let Err(e) =
            publish_json(self.publisher.as_ref(), QueueName::AudioQueue.as_str(), &ready).await
        {
            remove_file_quietly(&opus).await;
            return Err(e.into());
        }

        info!(guild_id = %message.guild_id, filename = %filename, "Published audio clip");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, MemoryBroker};
    use std::time::Duration;

    /// Writes the text itself as "audio".
    struct EchoEngine;

    #[async_trait]
    impl SpeechEngine for EchoEngine {
        fn extension(&self) -> &'static str {
            "mp3"
        }

        async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError> {
            tokio::fs::write(output, text).await?;
            Ok(())
        }
    }

    enum TranscodeMode {
        Copy,
        /// Write a partial file, then fail.
        FailPartway,
        TimeOut,
    }

    struct FakeTranscoder(TranscodeMode);

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn to_opus(&self, input: &Path, output: &Path) -> Result<(), SpeechError> {
            match self.0 {
                TranscodeMode::Copy => {
                    tokio::fs::copy(input, output).await?;
                    Ok(())
                }
                TranscodeMode::FailPartway => {
                    tokio::fs::write(output, b"partial").await?;
                    Err(SpeechError::Exit {
                        program: "ffmpeg".into(),
                        status: "exit status: 1".into(),
                        stderr: "invalid data".into(),
                    })
                }
                TranscodeMode::TimeOut => Err(SpeechError::TimedOut {
                    what: "transcode",
                    timeout: Duration::from_secs(60),
                }),
            }
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(&self, queue: &str, _payload: Vec<u8>) -> Result<(), BrokerError> {
            Err(BrokerError::NotConfirmed {
                queue: queue.to_string(),
            })
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn zinger(text: &str) -> CommentaryMessage {
        CommentaryMessage {
            text: text.into(),
            guild_id: "123".into(),
        }
    }

    #[tokio::test]
    async fn publishes_opus_clip_and_removes_raw_file() {
        let dir = tempfile::tempdir().unwrap();
        let broker = MemoryBroker::new();
        let stage = SpeechSynthesizer::new(
            Arc::new(EchoEngine),
            Arc::new(FakeTranscoder(TranscodeMode::Copy)),
            Arc::new(broker.clone()),
            dir.path(),
        );

        stage.handle(&zinger("gg ez")).await.unwrap();

        let ready: Vec<AudioReadyMessage> = broker.drain_json("audio_queue").unwrap();
        assert_eq!(ready.len(), 1);
        let clip = &ready[0];
        assert_eq!(clip.guild_id, "123");
        assert!(clip.filename.starts_with("tts_"));
        assert_eq!(
            Path::new(&clip.path),
            dir.path().join(format!("{}.opus", clip.filename))
        );
        assert_eq!(files_in(dir.path()), vec![format!("{}.opus", clip.filename)]);
        assert_eq!(std::fs::read_to_string(&clip.path).unwrap(), "gg ez");
    }

    #[tokio::test]
    async fn redelivered_message_gets_a_distinct_file() {
        let dir = tempfile::tempdir().unwrap();
        let broker = MemoryBroker::new();
        let stage = SpeechSynthesizer::new(
            Arc::new(EchoEngine),
            Arc::new(FakeTranscoder(TranscodeMode::Copy)),
            Arc::new(broker.clone()),
            dir.path(),
        );

        stage.handle(&zinger("gg ez")).await.unwrap();
        stage.handle(&zinger("gg ez")).await.unwrap();

        let ready: Vec<AudioReadyMessage> = broker.drain_json("audio_queue").unwrap();
        assert_eq!(ready.len(), 2);
        assert_ne!(ready[0].filename, ready[1].filename);
        assert_eq!(files_in(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn failed_transcode_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let broker = MemoryBroker::new();
        let stage = SpeechSynthesizer::new(
            Arc::new(EchoEngine),
            Arc::new(FakeTranscoder(TranscodeMode::FailPartway)),
            Arc::new(broker.clone()),
            dir.path(),
        );

        let err = stage.handle(&zinger("gg ez")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(files_in(dir.path()).is_empty());
        assert!(broker.is_empty("audio_queue"));
    }

    #[tokio::test]
    async fn transcode_timeout_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let stage = SpeechSynthesizer::new(
            Arc::new(EchoEngine),
            Arc::new(FakeTranscoder(TranscodeMode::TimeOut)),
            Arc::new(MemoryBroker::new()),
            dir.path(),
        );

        let err = stage.handle(&zinger("gg ez")).await.unwrap_err();
        assert!(matches!(err, StageError::TimedOut(_)));
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let stage = SpeechSynthesizer::new(
            Arc::new(EchoEngine),
            Arc::new(FakeTranscoder(TranscodeMode::Copy)),
            Arc::new(MemoryBroker::new()),
            dir.path(),
        );

        let err = stage.handle(&zinger("  ")).await.unwrap_err();
        assert!(matches!(err, StageError::Rejected(_)));
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn failed_publish_removes_finished_clip() {
        let dir = tempfile::tempdir().unwrap();
        let stage = SpeechSynthesizer::new(
            Arc::new(EchoEngine),
            Arc::new(FakeTranscoder(TranscodeMode::Copy)),
            Arc::new(FailingPublisher),
            dir.path(),
        );

        let err = stage.handle(&zinger("gg ez")).await.unwrap_err();
        assert!(matches!(err, StageError::Broker(_)));
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn prepare_creates_audio_dir() {
        let dir = tempfile::tempdir().unwrap();
        let audio_dir = dir.path().join("shared").join("audio");
        let stage = SpeechSynthesizer::new(
            Arc::new(EchoEngine),
            Arc::new(FakeTranscoder(TranscodeMode::Copy)),
            Arc::new(MemoryBroker::new()),
            &audio_dir,
        );

        stage.prepare().await.unwrap();
        assert!(audio_dir.is_dir());
    }
}
