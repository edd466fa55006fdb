use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    commands::Command,
    config::Config,
    domain::InboundMessage,
    formatting::{escape_html, render_help, render_stats},
    memory::ConversationMemory,
    model::{ChatModel, Completion, CompletionRequest},
    rate_limit::RateLimiter,
    stats::SessionStats,
    Result,
};

/// One running bot session.
///
/// Owns the rate limiter, the session stats and the conversation memory.
/// Messenger adapters feed every human text message into [`BotSession::handle`]
/// and send back whatever reply it returns.
pub struct BotSession {
    cfg: Arc<Config>,
    model: Arc<dyn ChatModel>,
    limiter: RateLimiter,
    stats: SessionStats,
    memory: Mutex<ConversationMemory>,
    version: String,
}

impl BotSession {
    pub fn new(cfg: Arc<Config>, model: Arc<dyn ChatModel>) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let limiter = RateLimiter::new(cfg.rate_limit_requests, cfg.rate_limit_window)
            .with_session_id(session_id.clone())
            .with_display_names(cfg.users.clone());
        let stats = SessionStats::new(session_id, model.model(), cfg.pricing.clone());
        let memory = Mutex::new(ConversationMemory::new(cfg.memory_size));

        Self {
            cfg,
            model,
            limiter,
            stats,
            memory,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Version shown in the stats report.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn session_id(&self) -> &str {
        self.stats.session_id()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Handle one inbound message; returns the HTML reply, if any.
    ///
    /// Every message is remembered as conversation context, whether or not it
    /// is a command.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<Option<String>> {
        let command = self.cfg.commands.parse(&msg.text);

        {
            let mut memory = self.memory.lock().await;
            memory.remember_user(&msg.author, self.cfg.commands.strip_command(&msg.text));
        }

        tracing::info!(
            session = %self.session_id(),
            user = %msg.user,
            "{} said: {}",
            msg.author,
            msg.text
        );

        match command {
            Command::Chat(prompt) if prompt.is_empty() => Ok(Some(render_help(&self.cfg.commands))),
            Command::Chat(_) => self.chat(msg).await.map(Some),
            Command::Stats => {
                let snapshot = self.stats.snapshot().await;
                Ok(Some(render_stats(
                    &snapshot,
                    &self.version,
                    &self.cfg.users,
                    Local::now(),
                )))
            }
            Command::Help => Ok(Some(render_help(&self.cfg.commands))),
            Command::Ignored => Ok(None),
        }
    }

    async fn chat(&self, msg: &InboundMessage) -> Result<String> {
        let messages = {
            let memory = self.memory.lock().await;
            memory.context(&self.cfg.system_prompt)
        };
        let req = CompletionRequest { messages };

        // The rate-limit increment is charged before the call, so a failed
        // request still counts against the user.
        let completion: Completion = self
            .limiter
            .gate(&msg.user, move || self.model.complete(req))
            .await?;

        // Every real model call is a query; missing usage counts as zero tokens.
        let mut tokens = 0;
        let mut cost = 0.0;
        if !completion.refused {
            let usage = completion.usage.unwrap_or_default();
            cost = self
                .stats
                .record_completion(&msg.user, self.model.model(), usage)
                .await?;
            tokens = usage.total();
        }

        let reply = completion
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.cfg.default_error_answer.as_str())
            .to_string();

        {
            let mut memory = self.memory.lock().await;
            memory.remember_assistant(&self.cfg.bot_name, &reply);
        }

        tracing::info!(
            session = %self.session_id(),
            user = %msg.user,
            tokens,
            cost,
            "{} said: {}",
            self.cfg.bot_name,
            reply
        );

        Ok(escape_html(&reply))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        domain::{ChatId, UserId},
        errors::Error,
        model::{Role, TokenUsage},
    };

    #[derive(Default)]
    struct FakeModel {
        requests: StdMutex<Vec<CompletionRequest>>,
        replies: StdMutex<Vec<Result<Completion>>>,
    }

    impl FakeModel {
        fn push_reply(&self, reply: Result<Completion>) {
            self.replies.lock().unwrap().push(reply);
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn model(&self) -> &str {
            "model-x"
        }

        async fn complete(&self, req: CompletionRequest) -> Result<Completion> {
            self.requests.lock().unwrap().push(req);
            let scripted = {
                let mut replies = self.replies.lock().unwrap();
                if replies.is_empty() {
                    None
                } else {
                    Some(replies.remove(0))
                }
            };
            scripted.unwrap_or_else(|| Ok(completion("ok", 100, 50)))
        }
    }

    fn completion(text: &str, input: u64, output: u64) -> Completion {
        Completion::new(
            "model-x-2024",
            Some(text.to_string()),
            Some(TokenUsage {
                input_tokens: input,
                output_tokens: output,
            }),
        )
    }

    fn test_config(rate_limit: u32) -> Arc<Config> {
        let vars: HashMap<String, String> = [
            ("TELEGRAM_BOT_TOKEN", "x"),
            ("OPENAI_API_KEY", "x"),
            ("PRICING_FILE", ""),
            ("DOGIMO_MODEL", "gpt-4o-mini"),
            ("DOGIMO_USERS", "bob=Bob"),
            ("SYSTEM_PROMPT", "be brief"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let mut cfg = Config::from_map(&vars).unwrap();

        let mut pricing = crate::pricing::PricingTable::default();
        pricing.insert("model-x", crate::pricing::ModelPrice::new(1.0, 2.0));
        cfg.pricing = Arc::new(pricing);
        cfg.rate_limit_requests = rate_limit;
        Arc::new(cfg)
    }

    fn msg(user: &str, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(1),
            user: UserId::new(user),
            author: user.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn chat_records_stats_and_remembers_reply() {
        let model = Arc::new(FakeModel::default());
        let session = BotSession::new(test_config(5), model.clone());

        session.handle(&msg("alice", "nice weather")).await.unwrap();
        let reply = session
            .handle(&msg("bob", "!dog what is a p-value?"))
            .await
            .unwrap();
        assert_eq!(reply.as_deref(), Some("ok"));

        let req = model.last_request();
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[0].content, "be brief");
        assert_eq!(req.messages[1].content, "alice said: nice weather");
        assert_eq!(req.messages[2].content, "bob said: what is a p-value?");

        let c = session.stats().snapshot().await.counters;
        assert_eq!(c.total_tokens, 150);
        assert_eq!(c.total_queries, 1);
        assert!((c.total_cost - 0.0002).abs() < 1e-12);
        assert_eq!(c.user(&UserId::new("bob")).unwrap().queries, 1);

        // The reply is now part of the context.
        session.handle(&msg("bob", "!dog and then?")).await.unwrap();
        let req = model.last_request();
        assert!(req
            .messages
            .iter()
            .any(|m| m.role == Role::Assistant && m.content == "Dogimo said: ok"));
    }

    #[tokio::test]
    async fn empty_model_text_uses_default_answer() {
        let model = Arc::new(FakeModel::default());
        model.push_reply(Ok(Completion::new(
            "model-x",
            Some("   ".to_string()),
            Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 0,
            }),
        )));
        let session = BotSession::new(test_config(5), model);

        let reply = session.handle(&msg("bob", "!dog hi")).await.unwrap();
        assert_eq!(
            reply.as_deref(),
            Some("Sorry, I couldn't get a proper answer.")
        );
        assert_eq!(session.stats().snapshot().await.counters.total_tokens, 10);
    }

    #[tokio::test]
    async fn reply_without_usage_still_counts_as_a_query() {
        let model = Arc::new(FakeModel::default());
        model.push_reply(Ok(Completion::new("model-x", Some("answer".to_string()), None)));
        let session = BotSession::new(test_config(5), model.clone());

        let reply = session.handle(&msg("bob", "!dog hi")).await.unwrap();
        assert_eq!(reply.as_deref(), Some("answer"));
        assert_eq!(model.calls(), 1);

        let c = session.stats().snapshot().await.counters;
        assert_eq!(c.total_queries, 1);
        assert_eq!(c.total_tokens, 0);
        assert_eq!(c.total_cost, 0.0);
        let bob = c.user(&UserId::new("bob")).copied().unwrap();
        assert_eq!(bob.queries, 1);
        assert_eq!(bob.tokens, 0);
    }

    #[tokio::test]
    async fn refused_requests_skip_model_and_stats() {
        let model = Arc::new(FakeModel::default());
        let session = BotSession::new(test_config(2), model.clone());

        for _ in 0..2 {
            session.handle(&msg("alice", "!dog hi")).await.unwrap();
        }
        let reply = session
            .handle(&msg("alice", "!dog again"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(model.calls(), 2);
        assert!(reply.contains("alice"));
        assert!(reply.contains("60 seconds"));
        assert_eq!(session.stats().snapshot().await.counters.total_queries, 2);

        // Users in the directory are addressed by display name.
        for _ in 0..2 {
            session.handle(&msg("bob", "!dog hi")).await.unwrap();
        }
        let reply = session
            .handle(&msg("bob", "!dog again"))
            .await
            .unwrap()
            .unwrap();
        assert!(reply.contains("Not so fast, Bob."));
        assert_eq!(model.calls(), 4);

        // Other users are unaffected.
        let reply = session.handle(&msg("carol", "!dog hi")).await.unwrap();
        assert_eq!(reply.as_deref(), Some("ok"));
        assert_eq!(model.calls(), 5);
        assert_eq!(session.stats().snapshot().await.counters.total_queries, 5);
    }

    #[tokio::test]
    async fn model_errors_propagate_and_stay_charged() {
        let model = Arc::new(FakeModel::default());
        model.push_reply(Err(Error::External("upstream down".to_string())));
        let session = BotSession::new(test_config(1), model.clone());

        let err = session.handle(&msg("bob", "!dog hi")).await.unwrap_err();
        assert!(matches!(err, Error::External(_)));
        assert_eq!(session.stats().snapshot().await.counters.total_queries, 0);

        let reply = session
            .handle(&msg("bob", "!dog retry"))
            .await
            .unwrap()
            .unwrap();
        assert!(reply.starts_with("🛑"));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn stats_help_and_chatter() {
        let model = Arc::new(FakeModel::default());
        let session = BotSession::new(test_config(5), model.clone()).with_version("9.9.9");

        assert_eq!(session.handle(&msg("bob", "hello all")).await.unwrap(), None);
        session.handle(&msg("bob", "!dog hi")).await.unwrap();

        let stats = session.handle(&msg("bob", "!stats")).await.unwrap().unwrap();
        assert!(stats.contains(session.session_id()));
        assert!(stats.contains("9.9.9"));
        assert!(stats.contains("<b>Total tokens:</b> 150"));
        assert!(stats.contains("| Bob             | 150"));

        let help = session.handle(&msg("bob", "!help")).await.unwrap().unwrap();
        assert!(help.contains("!stats"));

        // A bare chat command shows the help instead of calling the model.
        let bare = session.handle(&msg("bob", "!dog")).await.unwrap().unwrap();
        assert_eq!(bare, help);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn replies_are_html_escaped() {
        let model = Arc::new(FakeModel::default());
        model.push_reply(Ok(completion("use <b> & <i>", 1, 1)));
        let session = BotSession::new(test_config(5), model);

        let reply = session.handle(&msg("bob", "!dog tags?")).await.unwrap();
        assert_eq!(reply.as_deref(), Some("use &lt;b&gt; &amp; &lt;i&gt;"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_messages_keep_totals_consistent() {
        let model = Arc::new(FakeModel::default());
        let session = Arc::new(BotSession::new(test_config(1000), model.clone()));

        let mut handles = Vec::new();
        for i in 0..40 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("user-{}", i % 4);
                session.handle(&msg(&user, "!dog hi")).await.unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().as_deref(), Some("ok"));
        }

        let c = session.stats().snapshot().await.counters;
        assert_eq!(model.calls(), 40);
        assert_eq!(c.total_queries, 40);
        assert_eq!(c.total_tokens, 40 * 150);
        assert_eq!(
            c.per_user.values().map(|u| u.tokens).sum::<u64>(),
            c.total_tokens
        );
    }
}
