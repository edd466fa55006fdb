//! Telegram adapter (teloxide).
//!
//! Feeds text messages into the core `BotSession` and sends its HTML replies.

use teloxide::{
    prelude::*,
    types::{ChatAction, ParseMode},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use dogimo_core::{domain::ChatId, errors::Error, Result};

/// Telegram rejects longer messages.
pub const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(retry_after = ?d, "telegram rate limited; retrying");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    /// Send an HTML reply, split into as many messages as needed.
    pub async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        for chunk in split_html(html, MAX_MESSAGE_LEN) {
            self.with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), chunk.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        }
        Ok(())
    }

    pub async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_chat_action(Self::tg_chat(chat_id), ChatAction::Typing)
        })
        .await?;
        Ok(())
    }
}

/// Split `text` into chunks of at most `max` bytes.
///
/// Prefers breaking after a newline and never cuts through a UTF-8 character,
/// an HTML entity such as `&amp;` or a tag.
pub fn split_message(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }

        let head = &rest[..cut];
        if let Some(nl) = head.rfind('\n') {
            if nl > 0 {
                cut = nl + 1;
            }
        } else {
            // Back off to before an unterminated entity or tag.
            for (open, close) in [('&', ';'), ('<', '>')] {
                if let Some(at) = head[..cut].rfind(open) {
                    if at > 0 && !head[at..cut].contains(close) {
                        cut = at;
                    }
                }
            }
        }

        if cut == 0 {
            // A single character wider than `max`; emit it whole.
            cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }

        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

const PRE_OPEN: &str = "<pre>";
const PRE_CLOSE: &str = "</pre>";

/// Split Telegram HTML into chunks of at most `max` bytes that each parse on
/// their own: a `<pre>` block cut across chunks is closed at the end of one
/// chunk and reopened at the start of the next.
pub fn split_html(html: &str, max: usize) -> Vec<String> {
    let budget = max.saturating_sub(PRE_OPEN.len() + PRE_CLOSE.len()).max(1);
    let mut out = Vec::new();
    let mut in_pre = false;

    for chunk in split_message(html, budget) {
        let mut piece = String::with_capacity(chunk.len() + PRE_OPEN.len() + PRE_CLOSE.len());
        if in_pre {
            piece.push_str(PRE_OPEN);
        }
        piece.push_str(chunk);

        in_pre = pre_open_after(chunk, in_pre);
        if in_pre {
            piece.push_str(PRE_CLOSE);
        }
        out.push(piece);
    }
    out
}

/// Whether a `<pre>` block is still open after `chunk`.
fn pre_open_after(chunk: &str, mut open: bool) -> bool {
    let mut rest = chunk;
    loop {
        let tag = if open { PRE_CLOSE } else { PRE_OPEN };
        match rest.find(tag) {
            Some(i) => {
                open = !open;
                rest = &rest[i + tag.len()..];
            }
            None => return open,
        }
    }
}

/// Identity used for rate limiting and stats: the @username, or the numeric id.
pub fn identity_of(username: Option<&str>, user_id: u64) -> String {
    match username {
        Some(u) if !u.trim().is_empty() => u.to_string(),
        _ => user_id.to_string(),
    }
}
