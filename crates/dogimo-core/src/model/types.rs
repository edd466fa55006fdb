use serde::{Deserialize, Serialize};

use crate::rate_limit::{Refusable, Refusal};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

}

/// Normalized request for a single completion.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Result of one model call.
///
/// A rate-limit refusal is also a `Completion` with `refused` set, so the
/// session relays both the same way.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub model: String,
    pub text: Option<String>,
    /// `None` when the provider reported no usage.
    pub usage: Option<TokenUsage>,
    /// Produced by the rate limiter; the model was never called.
    pub refused: bool,
}

impl Completion {
    pub fn new(model: impl Into<String>, text: Option<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            model: model.into(),
            text,
            usage,
            refused: false,
        }
    }
}

impl Refusable for Completion {
    fn refused(refusal: &Refusal) -> Self {
        Self {
            model: String::new(),
            text: Some(refusal.message()),
            usage: None,
            refused: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::UserId;

    #[test]
    fn usage_total_saturates() {
        let usage = TokenUsage {
            input_tokens: u64::MAX,
            output_tokens: 7,
        };
        assert_eq!(usage.total(), u64::MAX);
        assert_eq!(TokenUsage::default().total(), 0);
    }

    #[test]
    fn refusals_are_flagged() {
        let refusal = Refusal {
            identity: UserId::new("bob"),
            name: "Bob".to_string(),
            max_calls: 5,
            window: Duration::from_secs(60),
        };
        let c = Completion::refused(&refusal);
        assert!(c.refused);
        assert!(c.usage.is_none());
        assert!(!Completion::new("m", Some("hi".to_string()), None).refused);
    }
}
