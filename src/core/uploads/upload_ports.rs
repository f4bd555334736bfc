// The three seams the batch uploader talks through.
//
// The bot layer implements `PhotoSource` and `ChatNotifier`, the infra layer
// implements `FileStorage`. Tests swap in in-memory versions.

use super::upload_models::{ConversationId, PhotoRef, UploadedFile};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend is not authorized")]
    NotReady,
    #[error("Authorization failed: {0}")]
    Auth(String),
    #[error("Storage API rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to fetch photo {file_id}: {reason}")]
    Fetch { file_id: String, reason: String },
    #[error("Failed to send message to chat {conversation}: {reason}")]
    Send {
        conversation: ConversationId,
        reason: String,
    },
}

/// Downloads photo bytes from the messaging platform.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch(&self, photo: &PhotoRef) -> Result<Vec<u8>, GatewayError>;
}

/// Sends plain-text replies back into a conversation.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn notify(&self, conversation: ConversationId, text: &str) -> Result<(), GatewayError>;
}

/// Creates files in the configured destination folder.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Whether a credential is loaded. Arrivals are refused while this is false.
    async fn is_ready(&self) -> bool;

    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<UploadedFile, StorageError>;
}
