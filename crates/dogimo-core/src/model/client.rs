use async_trait::async_trait;

use crate::Result;

use super::types::{Completion, CompletionRequest};

/// Chat completion backend used by the bot session.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier sent to the provider (and used for pricing).
    fn model(&self) -> &str;

    async fn complete(&self, req: CompletionRequest) -> Result<Completion>;
}
