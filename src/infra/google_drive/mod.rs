// =============================================================================
// GOOGLE DRIVE MODULE
// =============================================================================
//
// Everything that talks to Google lives here: the one-time OAuth consent
// handshake (`oauth`) and the uploader the batch pipeline writes through
// (`drive_client`). The core layer only sees the `FileStorage` trait.
//
// **Environment Variables:**
// - `GOOGLE_OAUTH_CREDS` - OAuth client secrets JSON (needed for the consent flow)
// - `GOOGLE_TOKEN_JSON` - authorized-user credential produced by the consent flow
// - `DRIVE_FOLDER_ID` - folder new files are created in

pub mod drive_client;
pub mod oauth;

pub use drive_client::DriveClient;
pub use oauth::{AuthorizedUserCredentials, OAuthClientConfig, OAuthFlow};
