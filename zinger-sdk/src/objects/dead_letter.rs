use serde::{Deserialize, Serialize};

/// Envelope for a message that permanently failed processing.
///
/// Written to `<queue>.dead` for later inspection instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Queue the message was consumed from.
    pub queue: String,
    pub reason: String,
    /// Number of processing attempts made before giving up.
    pub attempts: u32,
    /// Unix timestamp of the final failure.
    pub failed_at: i64,
    /// Original message body, lossily decoded as UTF-8.
    pub body: String,
}

impl DeadLetter {
    pub fn new(queue: &str, reason: impl Into<String>, attempts: u32, body: &[u8]) -> Self {
        Self {
            queue: queue.to_string(),
            reason: reason.into(),
            attempts,
            failed_at: time::OffsetDateTime::now_utc().unix_timestamp(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}
