// src/cli/run.rs — Default command: run the bot until ctrl-c

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::bot::BotContext;
use crate::flow::CategoryTree;
use crate::infra::config::Config;
use crate::infra::logger::LogContext;
use crate::infra::paths;
use crate::integrations::telegram;
use crate::integrations::types::{ListingService, SessionStore};
use crate::integrations::{JsonFileStore, MarketplaceClient, OpenAIVisionAnalyzer, TelegramTransport};
use crate::session::SessionRegistry;

pub async fn run_bot(config: Config) -> anyhow::Result<()> {
    let token = config
        .telegram
        .resolve_token()
        .context("no Telegram bot token; set telegram.bot_token or TELEGRAM_BOT_TOKEN")?;
    let api_key = config
        .vision
        .resolve_api_key()
        .context("no vision API key; set vision.api_key or OPENAI_API_KEY")?;
    paths::ensure_dirs().await?;

    let transport = Arc::new(TelegramTransport::new(token));
    let who = transport.validate().await.context("Telegram token rejected")?;
    tracing::info!("{}", who);

    let marketplace = Arc::new(MarketplaceClient::new(&config.marketplace));
    let categories = match marketplace.get_categories().await {
        Ok(entries) => CategoryTree::from_entries(&entries),
        Err(e) => {
            // Browsing is unavailable; predictions still work.
            tracing::warn!("Could not load the category tree: {}", e);
            CategoryTree::default()
        }
    };
    tracing::info!("Loaded {} categories", categories.len());

    let store: Option<Arc<dyn SessionStore>> = match config.storage.resolve_path() {
        Some(path) => Some(Arc::new(JsonFileStore::open(
            path,
            config.telegram.allowed_users.clone(),
        )?)),
        None => {
            tracing::warn!("Running without a session store; logins are not persisted");
            None
        }
    };

    let ctx = Arc::new(BotContext {
        transport: transport.clone(),
        listing: marketplace.clone(),
        analyzer: Arc::new(OpenAIVisionAnalyzer::new(api_key, &config.vision)),
        auth: marketplace,
        store,
        categories: Arc::new(categories),
        log: LogContext::new(config.logging.dir.clone()),
        config: config.clone(),
    });
    let registry = Arc::new(SessionRegistry::new(ctx));

    let cancel = CancellationToken::new();
    let refresher = registry.spawn_refresher(cancel.clone());
    let poller = tokio::spawn(telegram::poll_updates(
        transport,
        registry.clone(),
        config.telegram.poll_timeout_secs,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    cancel.cancel();
    let _ = poller.await;
    let _ = refresher.await;
    registry.shutdown().await;
    Ok(())
}
