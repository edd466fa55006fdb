//! Telegram update handlers.
//!
//! Only human text messages reach the session; everything else is dropped.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    if user.is_bot {
        return Ok(());
    }

    if msg.text().is_some() {
        return text::handle_text(bot, msg, state).await;
    }

    Ok(())
}
