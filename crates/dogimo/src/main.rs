use std::sync::Arc;

use dogimo_openai::OpenAiChatModel;

use dogimo_core::{config::Config, session::BotSession};

#[tokio::main]
async fn main() -> Result<(), dogimo_core::Error> {
    dogimo_core::logging::init("dogimo")?;

    let cfg = Arc::new(Config::load()?);

    let model = Arc::new(OpenAiChatModel::new(
        cfg.openai_api_key.clone(),
        cfg.openai_base_url.clone(),
        cfg.model.clone(),
        cfg.query_timeout,
    )?);

    let session =
        Arc::new(BotSession::new(cfg.clone(), model).with_version(env!("CARGO_PKG_VERSION")));

    dogimo_telegram::router::run_polling(cfg, session)
        .await
        .map_err(|e| dogimo_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
