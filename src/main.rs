//! manhaj-bot: Telegram bot serving an admin-managed tree of study
//! sections over a webhook.

mod admin;
mod bot;
mod config;
mod db;
mod ingress;
mod membership;
mod menu;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/manhaj-bot.toml"));
    tracing::info!(
        "Starting manhaj-bot with config {}",
        config_path.display()
    );

    let config = Arc::new(config::Config::load(&config_path)?);
    tracing::info!(
        admin_count = config.admin_ids.len(),
        required_chats = config.required_chats.len(),
        port = config.port,
        max_concurrent = config.max_concurrent,
        "Configuration loaded"
    );

    // A store or client that fails to come up does not kill the process:
    // the ingress keeps serving /health reporting unhealthy.
    let db = match config.db_path.as_deref() {
        Some(db_path) => {
            match db::Db::open(
                db_path,
                config.db_pool_max,
                Duration::from_secs(config.db_acquire_timeout_secs),
            )
            .await
            {
                Ok(db) => Some(Arc::new(db)),
                Err(error) => {
                    tracing::error!(error = %error, db_path = %db_path.display(), "Failed to open database; continuing without store");
                    None
                }
            }
        }
        None => {
            tracing::error!("db_path is not set; continuing without store");
            None
        }
    };

    let client = match config.bot_token() {
        Ok(token) => Some(Arc::new(telegram::Client::new(
            token,
            Duration::from_secs(config.telegram_timeout_secs),
            config.telegram_max_retries,
        ))),
        Err(error) => {
            tracing::error!(error = %error, "Bot credential missing; continuing without Telegram client");
            None
        }
    };

    let mut bot_id = None;
    let mut bot_username = None;
    if let Some(client) = client.as_deref() {
        match client.me().await {
            Ok(me) => {
                bot_id = Some(me.user.id.0 as i64);
                bot_username = me.user.username.clone();
                tracing::info!(bot_id = ?bot_id, username = ?bot_username, "Bot identity resolved");
            }
            Err(error) => {
                tracing::warn!(error = %error, "Failed to resolve bot identity via getMe");
            }
        }

        if let Some(base) = config.webhook_url.as_deref() {
            let target = format!("{}/webhook", base.trim_end_matches('/'));
            match url::Url::parse(&target) {
                Ok(webhook_url) => {
                    match client
                        .set_webhook(webhook_url, config.webhook_secret.as_deref())
                        .await
                    {
                        Ok(()) => tracing::info!(webhook = %target, "Webhook registered"),
                        Err(error) => {
                            tracing::error!(error = %error, webhook = %target, "Failed to register webhook");
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, webhook = %target, "Invalid webhook URL");
                }
            }
        } else {
            tracing::warn!("webhook_url not set; webhook won't be auto-registered");
        }
    }

    let app = bot::handlers::AppState {
        config: config.clone(),
        db,
        client: client.clone(),
        sessions: Arc::new(admin::Sessions::default()),
        bot_id,
        bot_username,
    };

    ingress::serve(ingress::WebState::new(app), config.port).await?;

    if let Some(client) = client.as_deref()
        && config.webhook_url.is_some()
    {
        match client.delete_webhook().await {
            Ok(()) => tracing::info!("Webhook deleted"),
            Err(error) => tracing::warn!(error = %error, "Failed to delete webhook during shutdown"),
        }
    }

    Ok(())
}
