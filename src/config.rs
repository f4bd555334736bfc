// Process configuration, read once from the environment (and `.env`, loaded in main).
//
// Variable names match the ones the bot has always been deployed with, so an
// existing Render service keeps working.

use crate::core::uploads::DEFAULT_QUIET_PERIOD;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a number, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `TOKEN_BOT`. Without it only the web endpoint runs.
    pub bot_token: Option<String>,
    /// `DRIVE_FOLDER_ID`. Files land in the Drive root when unset.
    pub drive_folder_id: Option<String>,
    /// `GOOGLE_OAUTH_CREDS`: the OAuth client secrets JSON from the Cloud Console.
    pub oauth_client_json: Option<String>,
    /// `GOOGLE_TOKEN_JSON`: the authorized-user credential produced by `/oauth2callback`.
    pub token_json: Option<String>,
    /// Public base URL, used to build the OAuth redirect URI.
    pub external_url: String,
    pub port: u16,
    /// How long a chat has to stay quiet before its photos are uploaded.
    pub quiet_period: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidNumber {
                key: "PORT",
                value: raw.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        let quiet_period = match get("BATCH_QUIET_PERIOD_SECS") {
            Some(raw) => {
                let secs = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|s| s.is_finite() && *s >= 0.0)
                    .ok_or_else(|| ConfigError::InvalidNumber {
                        key: "BATCH_QUIET_PERIOD_SECS",
                        value: raw.clone(),
                    })?;
                if secs == 0.0 {
                    return Err(ConfigError::Zero {
                        key: "BATCH_QUIET_PERIOD_SECS",
                    });
                }
                Duration::from_secs_f64(secs)
            }
            None => DEFAULT_QUIET_PERIOD,
        };

        // Render injects RENDER_EXTERNAL_URL; EXTERNAL_URL covers everything else.
        let external_url = get("RENDER_EXTERNAL_URL")
            .or_else(|| get("EXTERNAL_URL"))
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            bot_token: get("TOKEN_BOT"),
            drive_folder_id: get("DRIVE_FOLDER_ID"),
            oauth_client_json: get("GOOGLE_OAUTH_CREDS"),
            token_json: get("GOOGLE_TOKEN_JSON"),
            external_url,
            port,
            quiet_period,
        })
    }

    /// Must match an authorized redirect URI of the OAuth client exactly.
    pub fn redirect_uri(&self) -> String {
        format!("{}/oauth2callback", self.external_url)
    }
}
