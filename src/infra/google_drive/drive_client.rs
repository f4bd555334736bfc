// =============================================================================
// GOOGLE DRIVE CLIENT
// =============================================================================
//
// Creates files in one destination folder using the Drive v3 resumable upload
// protocol:
//
// 1. POST the file metadata to `/upload/drive/v3/files?uploadType=resumable`
// 2. Google answers with a session URI in the `Location` header
// 3. PUT the bytes to that URI, which answers with the created file
//
// Access tokens come from the authorized-user refresh token and are cached
// until a minute before they expire.

use super::oauth::{http_client, refresh_access_token, AuthorizedUserCredentials, REQUEST_TIMEOUT};
use crate::core::uploads::{FileStorage, StorageError, UploadedFile};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
/// Tokens this close to expiry are refreshed instead of reused.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access token with its expiration.
#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS)
    }
}

/// The loaded credential plus whatever access token it last produced.
struct DriveSession {
    credentials: AuthorizedUserCredentials,
    cached_token: Option<CachedToken>,
}

impl DriveSession {
    fn new(credentials: AuthorizedUserCredentials) -> Self {
        // A token without a known expiry is never trusted.
        let cached_token = match (credentials.token.clone(), credentials.expires_at()) {
            (Some(token), Some(expires_at)) => Some(CachedToken { token, expires_at }),
            _ => None,
        };
        Self {
            credentials,
            cached_token,
        }
    }

    fn usable_token(&self, now: DateTime<Utc>) -> Option<String> {
        self.cached_token
            .as_ref()
            .filter(|cached| cached.is_fresh(now))
            .map(|cached| cached.token.clone())
    }
}

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct DriveClient {
    client: Client,
    upload_base: String,
    folder_id: Option<String>,
    session: RwLock<Option<DriveSession>>,
}

impl DriveClient {
    /// Creates a client. Without credentials it stays "not ready" until `reload`.
    pub fn new(
        folder_id: Option<String>,
        credentials: Option<AuthorizedUserCredentials>,
    ) -> Result<Self, StorageError> {
        let client =
            http_client(REQUEST_TIMEOUT).map_err(|e| StorageError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            folder_id,
            session: RwLock::new(credentials.map(DriveSession::new)),
        })
    }

    /// Swaps in a new credential, e.g. right after the consent flow finished.
    pub async fn reload(&self, credentials: AuthorizedUserCredentials) {
        let mut session = self.session.write().await;
        *session = Some(DriveSession::new(credentials));
        tracing::info!("Google Drive credential reloaded");
    }

    /// Gets a valid access token, refreshing if necessary.
    async fn access_token(&self) -> Result<String, StorageError> {
        {
            let session = self.session.read().await;
            match session.as_ref() {
                None => return Err(StorageError::NotReady),
                Some(s) => {
                    if let Some(token) = s.usable_token(Utc::now()) {
                        return Ok(token);
                    }
                }
            }
        }

        let mut session = self.session.write().await;
        let session = session.as_mut().ok_or(StorageError::NotReady)?;

        // Another upload may have refreshed while we waited for the lock.
        if let Some(token) = session.usable_token(Utc::now()) {
            return Ok(token);
        }

        let now = Utc::now();
        let response = refresh_access_token(&self.client, &session.credentials)
            .await
            .map_err(|e| StorageError::Auth(e.to_string()))?;

        let expires_at = response
            .expires_at(now)
            .unwrap_or_else(|| now + ChronoDuration::hours(1));
        tracing::debug!(%expires_at, "Refreshed Google access token");

        session.cached_token = Some(CachedToken {
            token: response.access_token.clone(),
            expires_at,
        });
        Ok(response.access_token)
    }

    async fn start_resumable_upload(
        &self,
        token: &str,
        filename: &str,
        mime_type: &str,
        length: usize,
    ) -> Result<String, StorageError> {
        let metadata = FileMetadata {
            name: filename,
            parents: self.folder_id.as_deref().into_iter().collect(),
        };

        let response = self
            .client
            .post(format!("{}/files", self.upload_base))
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", "id,name"),
            ])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", length)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let response = ensure_success(response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                StorageError::InvalidResponse("resumable session has no Location header".into())
            })
    }
}

/// Turns a non-2xx response into `StorageError::Rejected` with the body for context.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e));
    Err(StorageError::Rejected { status, body })
}

#[async_trait]
impl FileStorage for DriveClient {
    async fn is_ready(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<UploadedFile, StorageError> {
        let token = self.access_token().await?;
        let session_uri = self
            .start_resumable_upload(&token, filename, mime_type, bytes.len())
            .await?;

        let response = self
            .client
            .put(&session_uri)
            .header(CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let created: DriveFile = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

        tracing::info!(file_id = %created.id, "Created '{}' in Google Drive", filename);

        Ok(UploadedFile {
            name: created.name.unwrap_or_else(|| filename.to_string()),
            id: created.id,
        })
    }
}
