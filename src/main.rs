mod admins;
mod app;
mod card;
mod commands;
mod config;
mod error;
mod gateway;
mod health;
mod platform;
mod router;
mod routes;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppContext;
use crate::commands::Command;
use crate::config::Config;
use crate::platform::telegram::{self, TelegramGateway};
use crate::scheduler::Scheduler;

/// Telegram long polling keeps a request open for up to this long on top of
/// the regular request timeout.
const POLLING_SLACK: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional TOML file; environment variables take precedence
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Refusing to start: {:#}", e);
            return Err(e);
        }
    };

    info!("Configuration loaded successfully");
    info!("  Owner: {}", config.owner_id);
    info!("  Admin persistence: {}", config.persistence_enabled());
    info!("  Liveness port: {}", config.server.port);

    let client = teloxide::net::default_reqwest_settings()
        .timeout(config.request_timeout + POLLING_SLACK)
        .build()
        .context("Failed to build Telegram HTTP client")?;
    let bot = Bot::with_client(&config.telegram.bot_token, client);

    let me = bot.get_me().await.context("Failed to reach Telegram (check BOT_TOKEN)")?;
    info!("Authorized as @{}", me.username());

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let ctx = Arc::new(AppContext::new(config, gateway, me.username())?);

    let mut scheduler = Scheduler::new().await?;
    scheduler::tasks::register_builtin_tasks(&scheduler, ctx.routes.clone()).await?;
    scheduler.start().await?;

    let port = ctx.config.server.port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(port).await {
            error!("Liveness endpoint stopped: {:#}", e);
        }
    });

    info!("Relay is starting...");
    telegram::run(ctx, bot).await?;

    scheduler.shutdown().await?;
    Ok(())
}
