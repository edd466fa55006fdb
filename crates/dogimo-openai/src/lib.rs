//! OpenAI adapter (chat completions).
//!
//! Talks to any OpenAI-compatible `chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use dogimo_core::{
    errors::Error,
    model::{ChatMessage, ChatModel, Completion, CompletionRequest, TokenUsage},
    Result,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct OpenAiChatModel {
    pub api_key: String,
    pub base_url: String,
    model: String,
    http: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("openai client build error: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn parse_completion(body: &str) -> Result<Completion> {
    let parsed: ChatResponseBody = serde_json::from_str(body)
        .map_err(|e| Error::External(format!("openai json error: {e}")))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content);

    let usage = parsed.usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });
    Ok(Completion::new(parsed.model, text, usage))
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: CompletionRequest) -> Result<Completion> {
        let body = ChatRequestBody {
            model: &self.model,
            messages: &req.messages,
        };

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("openai read error: {e}")))?;

        if !status.is_success() {
            return Err(Error::External(format!(
                "openai chat completion failed: {status} {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let completion = parse_completion(&text)?;
        tracing::debug!(
            model = %completion.model,
            usage = ?completion.usage,
            "openai chat completion"
        );
        Ok(completion)
    }
}
