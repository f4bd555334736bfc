// =============================================================================
// GOOGLE OAUTH 2.0 (AUTHORIZED USER)
// =============================================================================
//
// The bot uploads into a personal Drive, so it needs a user's consent rather
// than a service account. The consent happens once, in a browser:
//
// 1. `/` links to Google's consent screen (built by `authorization_url`)
// 2. Google redirects back to `/oauth2callback?code=...`
// 3. `exchange_code` trades the code for a refresh token
// 4. The operator stores the resulting JSON as `GOOGLE_TOKEN_JSON`
//
// The JSON layout is the "authorized_user" format Google's client libraries
// read and write, so a token minted by other tooling works here too.

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Full Drive access. `drive.file` would be enough for uploads, but it can't
/// see a folder the app didn't create.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Upper bound for any single Google request: token endpoint or Drive upload.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client shared by the token and Drive calls, bounded by `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Client secrets need a \"web\" or \"installed\" section")]
    MissingClientSection,
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Token endpoint rejected the request ({status}): {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// =============================================================================
// CLIENT SECRETS
// =============================================================================

/// One OAuth client as downloaded from the Cloud Console.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    web: Option<OAuthClientConfig>,
    installed: Option<OAuthClientConfig>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl OAuthClientConfig {
    /// Parses a `client_secret_*.json` file. Web clients take precedence.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let file: ClientSecretsFile = serde_json::from_str(json)?;
        let config = file
            .web
            .or(file.installed)
            .ok_or(AuthError::MissingClientSection)?;

        if config.client_id.is_empty() {
            return Err(AuthError::MissingField("client_id"));
        }
        Ok(config)
    }
}

// =============================================================================
// AUTHORIZED USER CREDENTIALS
// =============================================================================

/// Long-lived credential: a refresh token plus the client that minted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizedUserCredentials {
    /// Last access token, if any. Reused until `expiry`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// RFC 3339 timestamp of `token` expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
}

impl AuthorizedUserCredentials {
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        let credentials: Self = serde_json::from_str(json)?;

        if credentials.refresh_token.is_empty() {
            return Err(AuthError::MissingField("refresh_token"));
        }
        if credentials.client_id.is_empty() {
            return Err(AuthError::MissingField("client_id"));
        }
        if credentials.client_secret.is_empty() {
            return Err(AuthError::MissingField("client_secret"));
        }
        Ok(credentials)
    }

    pub fn to_json(&self) -> Result<String, AuthError> {
        Ok(serde_json::to_string(self)?)
    }

    /// When `token` stops working. Unparseable timestamps count as unknown.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry, measured from `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| now + ChronoDuration::seconds(secs))
    }
}

/// POSTs a form to a token endpoint and decodes the token response.
pub(crate) async fn request_token(
    client: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let response = client.post(token_uri).form(form).send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await?;
        return Err(AuthError::TokenEndpoint { status, body });
    }

    Ok(response.json().await?)
}

/// Trades a refresh token for a fresh access token.
pub(crate) async fn refresh_access_token(
    client: &Client,
    credentials: &AuthorizedUserCredentials,
) -> Result<TokenResponse, AuthError> {
    request_token(
        client,
        &credentials.token_uri,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", credentials.refresh_token.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ],
    )
    .await
}

// =============================================================================
// CONSENT FLOW
// =============================================================================

/// The browser half of the handshake: consent URL out, authorization code in.
pub struct OAuthFlow {
    client: Client,
    config: OAuthClientConfig,
    redirect_uri: String,
}

impl OAuthFlow {
    pub fn new(config: OAuthClientConfig, redirect_uri: String) -> Result<Self, AuthError> {
        Self::with_timeout(config, redirect_uri, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        config: OAuthClientConfig,
        redirect_uri: String,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            client: http_client(timeout)?,
            config,
            redirect_uri,
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Consent screen URL. `prompt=consent` forces Google to issue a refresh
    /// token even when the user already granted access before.
    pub fn authorization_url(&self) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            &self.config.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", DRIVE_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AuthError::InvalidUrl(e.to_string()))?;

        Ok(url.into())
    }

    /// Completes the handshake and returns the credential to persist.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthorizedUserCredentials, AuthError> {
        let response = request_token(
            &self.client,
            &self.config.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .await?;

        let credentials = self.credentials_from(response, Utc::now())?;
        tracing::info!(
            scopes = ?credentials.scopes,
            "Exchanged authorization code for a refresh token"
        );
        Ok(credentials)
    }

    fn credentials_from(
        &self,
        response: TokenResponse,
        now: DateTime<Utc>,
    ) -> Result<AuthorizedUserCredentials, AuthError> {
        let expiry = response
            .expires_at(now)
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Micros, true));

        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingField("refresh_token"))?;

        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => vec![DRIVE_SCOPE.to_string()],
        };

        Ok(AuthorizedUserCredentials {
            token: Some(response.access_token),
            refresh_token,
            token_uri: self.config.token_uri.clone(),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            scopes,
            expiry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WEB_SECRETS: &str = r#"{
        "web": {
            "client_id": "123.apps.googleusercontent.com",
            "project_id": "photo-bridge",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["https://bot.example/oauth2callback"]
        }
    }"#;

    fn flow() -> OAuthFlow {
        OAuthFlow::new(
            OAuthClientConfig::from_json(WEB_SECRETS).unwrap(),
            "https://bot.example/oauth2callback".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn parses_web_and_installed_clients() {
        let web = OAuthClientConfig::from_json(WEB_SECRETS).unwrap();
        assert_eq!(web.client_id, "123.apps.googleusercontent.com");

        let installed = OAuthClientConfig::from_json(
            r#"{"installed": {"client_id": "abc", "client_secret": "def"}}"#,
        )
        .unwrap();
        assert_eq!(installed.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(installed.auth_uri, DEFAULT_AUTH_URI);
    }

    #[test]
    fn rejects_secrets_without_a_client_section() {
        let err = OAuthClientConfig::from_json(r#"{"other": {}}"#).unwrap_err();
        assert!(matches!(err, AuthError::MissingClientSection));
    }

    #[test]
    fn authorization_url_requests_offline_drive_access() {
        let url = Url::parse(&flow().authorization_url().unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "123.apps.googleusercontent.com");
        assert_eq!(params["redirect_uri"], "https://bot.example/oauth2callback");
        assert_eq!(params["scope"], DRIVE_SCOPE);
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["prompt"], "consent");
    }

    #[test]
    fn reads_credentials_written_by_google_libraries() {
        let json = r#"{
            "token": "ya29.a0",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/drive"],
            "universe_domain": "googleapis.com",
            "account": "",
            "expiry": "2026-03-01T10:15:30.123456Z"
        }"#;

        let creds = AuthorizedUserCredentials::from_json(json).unwrap();
        assert_eq!(creds.token.as_deref(), Some("ya29.a0"));
        assert_eq!(
            creds.expires_at(),
            Some(
                Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 30).unwrap()
                    + ChronoDuration::microseconds(123_456)
            )
        );
    }

    #[test]
    fn credentials_require_a_refresh_token() {
        let err = AuthorizedUserCredentials::from_json(
            r#"{"client_id": "a", "client_secret": "b"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::MissingField("refresh_token")));

        assert!(matches!(
            AuthorizedUserCredentials::from_json("not json"),
            Err(AuthError::InvalidJson(_))
        ));
    }

    #[test]
    fn garbage_expiry_counts_as_unknown() {
        let creds = AuthorizedUserCredentials {
            token: Some("t".into()),
            refresh_token: "r".into(),
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "c".into(),
            client_secret: "s".into(),
            scopes: vec![],
            expiry: Some("next tuesday".into()),
        };
        assert!(creds.expires_at().is_none());
    }

    #[test]
    fn token_response_becomes_persistable_credentials() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let response = TokenResponse {
            access_token: "ya29.fresh".into(),
            expires_in: Some(3599),
            refresh_token: Some("1//refresh".into()),
            scope: Some(DRIVE_SCOPE.into()),
        };

        let creds = flow().credentials_from(response, now).unwrap();
        assert_eq!(creds.client_secret, "shh");
        assert_eq!(creds.scopes, vec![DRIVE_SCOPE.to_string()]);
        assert_eq!(
            creds.expires_at(),
            Some(now + ChronoDuration::seconds(3599))
        );

        // What the operator pastes back in must load again unchanged.
        let reloaded = AuthorizedUserCredentials::from_json(&creds.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, creds);
    }

    #[test]
    fn exchange_without_refresh_token_is_an_error() {
        let response = TokenResponse {
            access_token: "ya29.fresh".into(),
            expires_in: Some(3599),
            refresh_token: None,
            scope: None,
        };
        let err = flow().credentials_from(response, Utc::now()).unwrap_err();
        assert!(matches!(err, AuthError::MissingField("refresh_token")));
    }

    #[tokio::test]
    async fn silent_token_endpoint_times_out() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = OAuthClientConfig::from_json(WEB_SECRETS).unwrap();
        config.token_uri = format!("http://{}/token", addr);
        let flow = OAuthFlow::with_timeout(
            config,
            "https://bot.example/oauth2callback".to_string(),
            Duration::from_millis(200),
        )
        .unwrap();

        let started = std::time::Instant::now();
        let err = flow.exchange_code("4/0Ab-code").await.unwrap_err();

        assert!(matches!(&err, AuthError::Http(e) if e.is_timeout()), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
