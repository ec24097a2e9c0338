//! Speech synthesis engines and the Opus transcoder.
//!
//! External programs run through `tokio::process` with `kill_on_drop`, so a
//! call abandoned at its deadline does not leave the child running.

use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Longest text fragment the translate endpoint accepts per request.
const TRANSLATE_MAX_CHARS: usize = 200;
const TRANSLATE_URL: &str = "https://translate.google.com/translate_tts";

/// Errors returned by speech engines and transcoders.
#[derive(Debug, Error)]
pub enum SpeechError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The speech endpoint answered with an unexpected status
    #[error("speech endpoint returned status {0}")]
    Api(u16),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// External program could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    /// External program exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    /// The call exceeded its deadline
    #[error("{what} timed out after {timeout:?}")]
    TimedOut { what: &'static str, timeout: Duration },

    /// Nothing to synthesize
    #[error("text is blank")]
    BlankText,
}

impl SpeechError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SpeechError::TimedOut { .. })
    }
}

/// Turns text into an audio file.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Extension (without dot) of the files this engine writes.
    fn extension(&self) -> &'static str;

    /// Write speech for `text` to `output`.
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError>;
}

/// Converts an audio file to Opus.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn to_opus(&self, input: &Path, output: &Path) -> Result<(), SpeechError>;
}

/// Split `text` into fragments of at most `max_chars` characters, breaking on
/// whitespace where possible.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        // Hard-split words longer than a whole fragment.
        while word.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let split_at = word
                .char_indices()
                .nth(max_chars)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            chunks.push(word[..split_at].to_string());
            word = &word[split_at..];
        }
        if word.is_empty() {
            continue;
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Google Translate text-to-speech over HTTP. Writes MP3.
#[derive(Debug, Clone)]
pub struct TranslateSpeechEngine {
    http: Client,
    url: String,
    language: String,
    timeout: Duration,
}

impl TranslateSpeechEngine {
    pub fn new(language: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            url: TRANSLATE_URL.to_string(),
            language: language.into(),
            timeout,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Replace the default `reqwest::Client`.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    async fn fetch(&self, text: &str, output: &Path) -> Result<(), SpeechError> {
        let chunks = split_text(text, TRANSLATE_MAX_CHARS);
        let total = chunks.len().to_string();
        let mut file = tokio::fs::File::create(output).await?;

        for (idx, chunk) in chunks.iter().enumerate() {
            let response = self
                .http
                .get(&self.url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.to_string().as_str()),
                    ("textlen", chunk.chars().count().to_string().as_str()),
                    ("q", chunk.as_str()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(SpeechError::Api(status.as_u16()));
            }
            // MP3 frames concatenate into one playable stream.
            file.write_all(&response.bytes().await?).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl SpeechEngine for TranslateSpeechEngine {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::BlankText);
        }
        tokio::time::timeout(self.timeout, self.fetch(text, output))
            .await
            .map_err(|_| SpeechError::TimedOut {
                what: "speech synthesis",
                timeout: self.timeout,
            })??;
        debug!(output = %output.display(), "Synthesized speech");
        Ok(())
    }
}

/// Run `command` to completion within `timeout`, optionally feeding `stdin`.
async fn run_command(
    mut command: Command,
    program: &Path,
    stdin: Option<&str>,
    what: &'static str,
    timeout: Duration,
) -> Result<(), SpeechError> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program_name = program.display().to_string();
    let mut child = command.spawn().map_err(|source| SpeechError::Spawn {
        program: program_name.clone(),
        source,
    })?;

    let run = async {
        if let (Some(text), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(text.as_bytes()).await?;
            // Close stdin so the program sees end of input.
            drop(pipe);
        }
        child.wait_with_output().await
    };

    let output = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| SpeechError::TimedOut { what, timeout })??;

    if !output.status.success() {
        return Err(SpeechError::Exit {
            program: program_name,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Local text-to-speech binary (`espeak-ng` or compatible). Writes WAV.
///
/// Invoked as `<program> -v <voice> -w <output> --stdin` with the text on
/// standard input.
#[derive(Debug, Clone)]
pub struct CommandSpeechEngine {
    program: PathBuf,
    voice: String,
    timeout: Duration,
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<PathBuf>, voice: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            voice: voice.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::BlankText);
        }
        let mut command = Command::new(&self.program);
        command
            .arg("-v")
            .arg(&self.voice)
            .arg("-w")
            .arg(output)
            .arg("--stdin");
        run_command(
            command,
            &self.program,
            Some(text),
            "speech synthesis",
            self.timeout,
        )
        .await
    }
}

/// Transcodes with `ffmpeg -c:a libopus`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_opus(&self, input: &Path, output: &Path) -> Result<(), SpeechError> {
        let mut command = Command::new(&self.program);
        command
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-c:a", "libopus"])
            .arg(output);
        run_command(command, &self.program, None, "transcode", self.timeout).await?;
        debug!(output = %output.display(), "Transcoded to opus");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn split_text_respects_limit_and_words() {
        let chunks = split_text("gg ez no re", 5);
        assert_eq!(chunks, vec!["gg ez", "no re"]);

        let chunks = split_text("abcdefghij k", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij k"]);

        assert!(split_text("   ", 10).is_empty());
    }

    #[tokio::test]
    async fn transcoder_reports_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "ffmpeg", "echo broken input >&2; exit 1");
        let transcoder = FfmpegTranscoder::new(program, Duration::from_secs(5));

        let err = transcoder
            .to_opus(&dir.path().join("in.mp3"), &dir.path().join("out.opus"))
            .await
            .unwrap_err();
        match err {
            SpeechError::Exit { stderr, .. } => assert_eq!(stderr, "broken input"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn transcoder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "ffmpeg", "sleep 10");
        let transcoder = FfmpegTranscoder::new(program, Duration::from_millis(100));

        let err = transcoder
            .to_opus(&dir.path().join("in.mp3"), &dir.path().join("out.opus"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn command_engine_feeds_text_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        // Writes stdin to the path following -w.
        let program = script(
            dir.path(),
            "tts",
            r#"while [ "$1" != "-w" ]; do shift; done; cat > "$2""#,
        );
        let engine = CommandSpeechEngine::new(program, "en", Duration::from_secs(5));
        let output = dir.path().join("out.wav");

        engine.synthesize("gg ez", &output).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "gg ez");
    }

    #[tokio::test]
    async fn engines_reject_blank_text() {
        let engine = CommandSpeechEngine::new("espeak-ng", "en", Duration::from_secs(1));
        let err = engine
            .synthesize("  ", Path::new("/nonexistent/out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::BlankText));
    }
}
