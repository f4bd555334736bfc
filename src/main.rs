// This is the entry point of the Telegram → Google Drive photo bridge.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic): the debounced batch uploader
// - `infra/` = Implementations of core traits (Google OAuth + Drive)
// - `telegram/` = Telegram-specific adapters (dispatcher, downloads, replies)
// - `web/` = The authorization endpoint used once per deployment
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the web endpoint
// 4. Start the Telegram bot, if it has a token

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "telegram/telegram_layer.rs"]
mod telegram;
#[path = "web/web_layer.rs"]
mod web;

use crate::config::AppConfig;
use crate::core::uploads::BatchUploader;
use crate::infra::google_drive::{
    AuthorizedUserCredentials, DriveClient, OAuthClientConfig, OAuthFlow,
};
use crate::telegram::TelegramGateway;
use crate::web::WebState;
use std::sync::Arc;
use teloxide::Bot;

/// Loads the stored Drive credential. A bad one is logged, not fatal:
/// the web endpoint has to stay up so the operator can re-authorize.
fn load_credentials(config: &AppConfig) -> Option<AuthorizedUserCredentials> {
    let Some(json) = config.token_json.as_deref() else {
        tracing::warn!(
            "GOOGLE_TOKEN_JSON is not set. Open {} to authorize Google Drive access.",
            config.external_url
        );
        return None;
    };

    match AuthorizedUserCredentials::from_json(json) {
        Ok(credentials) => {
            tracing::info!("Loaded Google Drive credential");
            Some(credentials)
        }
        Err(e) => {
            tracing::error!(
                "GOOGLE_TOKEN_JSON is invalid ({}). Open {} to authorize again.",
                e,
                config.external_url
            );
            None
        }
    }
}

fn load_oauth_flow(config: &AppConfig) -> Option<Arc<OAuthFlow>> {
    let json = config.oauth_client_json.as_deref()?;
    let flow = OAuthClientConfig::from_json(json)
        .and_then(|client| OAuthFlow::new(client, config.redirect_uri()));
    match flow {
        Ok(flow) => Some(Arc::new(flow)),
        Err(e) => {
            tracing::error!("GOOGLE_OAUTH_CREDS is unusable: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // One Drive client for the whole process. The web endpoint can reload its
    // credential; the uploader only reads it.

    if config.drive_folder_id.is_none() {
        tracing::warn!("DRIVE_FOLDER_ID is not set; photos will land in the Drive root");
    }

    let drive = Arc::new(DriveClient::new(
        config.drive_folder_id.clone(),
        load_credentials(&config),
    )?);

    let web_state = WebState {
        drive: Arc::clone(&drive),
        oauth: load_oauth_flow(&config),
    };

    // ========================================================================
    // WEB ENDPOINT
    // ========================================================================

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("Authorization endpoint listening on port {}", config.port);
    let web_server =
        tokio::spawn(async move { axum::serve(listener, web::router(web_state)).await });

    // ========================================================================
    // TELEGRAM BOT
    // ========================================================================

    let Some(token) = config.bot_token.clone() else {
        tracing::error!("TOKEN_BOT is not set; the Telegram bot is disabled, only the web endpoint runs");
        web_server.await??;
        return Ok(());
    };

    let bot = Bot::new(token);
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let uploader = Arc::new(BatchUploader::new(
        gateway.clone(),
        gateway,
        drive,
        config.quiet_period,
    ));

    telegram::run_dispatcher(bot, Arc::clone(&uploader)).await;

    // Ctrl+C stopped the dispatcher.
    uploader.shutdown();
    web_server.abort();
    Ok(())
}
