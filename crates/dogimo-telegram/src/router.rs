use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use dogimo_core::{config::Config, session::BotSession};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub session: Arc<BotSession>,
    pub messenger: TelegramMessenger,
}

pub async fn run_polling(cfg: Arc<Config>, session: Arc<BotSession>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(
            bot = %me.username(),
            session = %session.session_id(),
            model = %cfg.model,
            "dogimo started"
        ),
        Err(e) => tracing::warn!("could not fetch bot info: {e}"),
    }
    tracing::info!(
        session = %session.session_id(),
        requests = session.limiter().max_calls(),
        window_secs = session.limiter().window_duration().as_secs(),
        memory = cfg.memory_size,
        "rate limit and memory configured"
    );

    let state = Arc::new(AppState {
        cfg,
        session,
        messenger: TelegramMessenger::new(bot.clone()),
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    tracing::info!("dogimo stopped");
    Ok(())
}
