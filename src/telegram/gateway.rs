// Telegram implementations of the core's platform seams.
//
// Downloads go through `getFile` + the file endpoint; replies are plain
// `sendMessage` calls with no markup.

use crate::core::uploads::{ChatNotifier, ConversationId, GatewayError, PhotoRef, PhotoSource};
use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::ChatId;

#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl PhotoSource for TelegramGateway {
    async fn fetch(&self, photo: &PhotoRef) -> Result<Vec<u8>, GatewayError> {
        let fetch_error = |reason: String| GatewayError::Fetch {
            file_id: photo.file_id.clone(),
            reason,
        };

        let file = self
            .bot
            .get_file(photo.file_id.clone())
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let mut bytes = Vec::with_capacity(photo.size_bytes.unwrap_or(0) as usize);
        self.bot
            .download_file(&file.path, &mut bytes)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        tracing::debug!(
            file_id = %photo.file_id,
            bytes = bytes.len(),
            "Downloaded photo from Telegram"
        );
        Ok(bytes)
    }
}

#[async_trait]
impl ChatNotifier for TelegramGateway {
    async fn notify(&self, conversation: ConversationId, text: &str) -> Result<(), GatewayError> {
        self.bot
            .send_message(ChatId(conversation.0), text)
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::Send {
                conversation,
                reason: e.to_string(),
            })
    }
}
