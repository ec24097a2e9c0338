//! CommentaryGenerator stage: `matches` -> `zingers`.

use super::worker::{Stage, StageError};
use crate::broker::{Publisher, publish_json};
use crate::sources::{CommentaryError, CommentaryModel};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use zinger_sdk::objects::{CommentaryMessage, MatchEvent, QueueName};

/// Generates commentary for each match event and publishes it with the
/// event's guild id.
pub struct CommentaryGenerator {
    model: Arc<dyn CommentaryModel>,
    publisher: Arc<dyn Publisher>,
}

impl CommentaryGenerator {
    pub fn new(model: Arc<dyn CommentaryModel>, publisher: Arc<dyn Publisher>) -> Self {
        Self { model, publisher }
    }
}

impl From<CommentaryError> for StageError {
    fn from(e: CommentaryError) -> Self {
        match e {
            CommentaryError::TimedOut(timeout) => StageError::TimedOut(timeout),
            other => StageError::Failed(other.to_string()),
        }
    }
}

#[async_trait]
impl Stage for CommentaryGenerator {
    type Input = MatchEvent;

    fn queue(&self) -> QueueName {
        QueueName::Matches
    }

    async fn handle(&self, event: &MatchEvent) -> Result<(), StageError> {
        let text = self.model.generate(event).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(StageError::Rejected(
                "generation service returned blank commentary".into(),
            ));
        }

        let message = CommentaryMessage {
            text: text.to_string(),
            guild_id: event.guild_id.clone(),
        };
        publish_json(self.publisher.as_ref(), QueueName::Zingers.as_str(), &message).await?;

        info!(
            guild_id = %event.guild_id,
            match_id = %event.match_id,
            player = %event.summoner_name,
            "Published commentary"
        );
        Ok(())
    }
}
