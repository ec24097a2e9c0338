pub mod dead_letter;
pub mod messages;
pub mod player;

pub use dead_letter::DeadLetter;
pub use messages::{AudioReadyMessage, CommentaryMessage, MatchEvent, MatchOutcome};
pub use player::{StatusResponse, TrackedPlayer};

/// Names of the durable queues connecting the pipeline stages.
///
/// Each consuming queue has a sibling dead-letter queue named
/// `<queue>.dead` that receives [`DeadLetter`] envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Match Watcher -> Commentary Generator.
    Matches,
    /// Commentary Generator -> Speech Synthesizer.
    Zingers,
    /// Speech Synthesizer -> Audio Dispatcher.
    AudioQueue,
}

impl QueueName {
    pub const ALL: [QueueName; 3] = [QueueName::Matches, QueueName::Zingers, QueueName::AudioQueue];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Matches => "matches",
            QueueName::Zingers => "zingers",
            QueueName::AudioQueue => "audio_queue",
        }
    }

    pub fn dead_letter(&self) -> &'static str {
        match self {
            QueueName::Matches => "matches.dead",
            QueueName::Zingers => "zingers.dead",
            QueueName::AudioQueue => "audio_queue.dead",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
