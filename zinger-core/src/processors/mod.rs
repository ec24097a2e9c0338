//! Pipeline stages.
//!
//! - `MatchWatcher`: polls the match-data source, emits `MatchEvent` on `matches`
//! - `CommentaryGenerator`: consumes `matches`, emits `CommentaryMessage` on `zingers`
//! - `SpeechSynthesizer`: consumes `zingers`, emits `AudioReadyMessage` on `audio_queue`
//! - `AudioDispatcher`: consumes `audio_queue`, plays clips in voice sessions
//!
//! The three consuming stages run inside a [`QueueWorker`], which owns
//! acknowledgement, retries and dead-lettering.

pub mod audio_dispatcher;
pub mod commentary_generator;
pub mod match_watcher;
pub mod speech_synthesizer;
pub mod worker;

pub use audio_dispatcher::AudioDispatcher;
pub use commentary_generator::CommentaryGenerator;
pub use match_watcher::{CycleReport, MatchWatcher, WatchError, build_match_event};
pub use speech_synthesizer::SpeechSynthesizer;
pub use worker::{Disposition, QueueWorker, Stage, StageError};
