//! Append-only conversation history used to build AI prompts. Trimmed to
//! the fields a job-context prompt actually needs: no tool-call envelopes,
//! since the planner never calls tools directly, only ever produces
//! structured plan/schedule objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>, sequence: u64) -> Self {
        Self {
            role,
            content: content.into(),
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Rough token estimate (chars/4 plus a fixed overhead), matching the
    /// heuristic used elsewhere in this codebase for budget truncation.
    pub fn estimate_tokens(&self) -> usize {
        (self.content.len() / 4 + 4).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_is_at_least_one() {
        let m = Message::new(MessageRole::User, "", 0);
        assert_eq!(m.estimate_tokens(), 4);
    }
}
