use std::sync::Arc;

use teloxide::prelude::*;

use dogimo_core::domain::{ChatId, InboundMessage, UserId};

use crate::identity_of;
use crate::router::AppState;

const FAILURE_REPLY: &str = "⚠️ Something went wrong while answering. Please try again later.";

pub async fn handle_text(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text().map(|s| s.to_string()) else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    let identity = identity_of(user.username.as_deref(), user.id.0);
    let chat_id = ChatId(msg.chat.id.0);
    let inbound = InboundMessage {
        chat_id,
        user: UserId::new(identity.clone()),
        author: identity,
        text,
    };

    let is_chat = matches!(
        state.cfg.commands.parse(&inbound.text),
        dogimo_core::commands::Command::Chat(_)
    );
    if is_chat {
        let _ = state.messenger.send_typing(chat_id).await;
    }

    let reply = match state.session.handle(&inbound).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return Ok(()),
        Err(e) => {
            tracing::error!(
                session = %state.session.session_id(),
                user = %inbound.user,
                "failed to handle message: {e}"
            );
            FAILURE_REPLY.to_string()
        }
    };

    if let Err(e) = state.messenger.send_html(chat_id, &reply).await {
        tracing::error!(chat = chat_id.0, "failed to send reply: {e}");
    }

    Ok(())
}
