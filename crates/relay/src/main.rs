use std::sync::Arc;

use tracing::{info, warn};

use relay_core::{
    config::Config,
    context::{ContextStore, InMemoryContextStore},
    conversation::Conversation,
};
use relay_openai::OpenAiClient;
use relay_sqlite::SqliteContextStore;

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn ContextStore> = match &cfg.database_url {
        Some(url) => {
            let store = SqliteContextStore::new(url).await?;
            info!(database = %url, "history stored in sqlite");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set; history is kept in memory and lost on restart");
            Arc::new(InMemoryContextStore::new())
        }
    };

    let model = Arc::new(OpenAiClient::new(cfg.llm.clone())?);
    info!(model = %cfg.llm.model, endpoint = %cfg.llm.base_url, "completion client ready");

    let conversation = Arc::new(
        Conversation::new(store, model, cfg.window).with_system_prompt(cfg.system_prompt.clone()),
    );

    relay_telegram::router::run_polling(cfg, conversation)
        .await
        .map_err(|e| relay_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
