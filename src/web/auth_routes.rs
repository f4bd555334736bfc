// Authorization endpoint.
//
// `GET /` either confirms the bot is connected or links to Google's consent
// screen. `GET /oauth2callback` finishes the exchange, installs the credential
// in the running Drive client and shows it so the operator can persist it.
// There is no authentication here: the URL is only meant to be reachable while
// someone is setting the bot up.

use super::pages;
use crate::core::uploads::FileStorage;
use crate::infra::google_drive::{DriveClient, OAuthFlow};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

type Page = (StatusCode, Html<String>);

#[derive(Clone)]
pub struct WebState {
    pub drive: Arc<DriveClient>,
    /// `None` when `GOOGLE_OAUTH_CREDS` is missing or invalid.
    pub oauth: Option<Arc<OAuthFlow>>,
}

/// Query Google appends to the redirect. Unknown keys (`scope`, `state`, ...) are ignored.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/oauth2callback", get(oauth_callback))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn home(State(state): State<WebState>) -> Page {
    if state.drive.is_ready().await {
        return (StatusCode::OK, Html(pages::ready_page()));
    }

    let Some(oauth) = state.oauth.as_ref() else {
        return missing_client_page();
    };

    match oauth.authorization_url() {
        Ok(url) => (StatusCode::OK, Html(pages::authorize_page(&url))),
        Err(e) => {
            tracing::error!("Failed to build consent URL: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::error_page(
                    "Authorization unavailable",
                    "The OAuth client configuration is invalid.",
                )),
            )
        }
    }
}

async fn oauth_callback(
    State(state): State<WebState>,
    Query(params): Query<CallbackParams>,
) -> Page {
    let Some(oauth) = state.oauth.as_ref() else {
        return missing_client_page();
    };

    if let Some(error) = params.error {
        tracing::warn!(%error, "Google consent was not granted");
        return (
            StatusCode::BAD_REQUEST,
            Html(pages::error_page(
                "Authorization was not granted",
                &format!("Google returned: {}", error),
            )),
        );
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Html(pages::error_page(
                "Missing authorization code",
                "Start again from the home page.",
            )),
        );
    };

    let credentials = match oauth.exchange_code(&code).await {
        Ok(credentials) => credentials,
        Err(e) => {
            tracing::error!(redirect_uri = oauth.redirect_uri(), "Code exchange failed: {}", e);
            return (
                StatusCode::BAD_GATEWAY,
                Html(pages::error_page(
                    "Authorization failed",
                    "Google did not accept the authorization code. Start again from the home page.",
                )),
            );
        }
    };

    let token_json = match credentials.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize credential: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::error_page(
                    "Authorization failed",
                    "The credential could not be displayed.",
                )),
            );
        }
    };

    state.drive.reload(credentials).await;
    (StatusCode::OK, Html(pages::credential_page(&token_json)))
}

fn missing_client_page() -> Page {
    tracing::error!("GOOGLE_OAUTH_CREDS is missing or invalid; cannot start the consent flow");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(pages::error_page(
            "Authorization unavailable",
            "Set GOOGLE_OAUTH_CREDS to the OAuth client secrets JSON and restart.",
        )),
    )
}
