// Inbound side of the bot: long-polls Telegram and feeds photos to the batch uploader.

use crate::core::uploads::{ArrivalOutcome, BatchUploader, ConversationId, PhotoRef};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{Message, PhotoSize};

/// Runs the long-polling dispatcher until Ctrl+C.
pub async fn run_dispatcher(bot: Bot, uploader: Arc<BatchUploader>) {
    let handler = Update::filter_message().endpoint(handle_message);

    tracing::info!("Telegram bot is ready to receive photos");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![uploader])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, uploader: Arc<BatchUploader>) -> ResponseResult<()> {
    // Only photo messages matter; documents, stickers and text are ignored.
    let Some(photo) = msg.photo().and_then(best_variant) else {
        return Ok(());
    };

    let conversation = ConversationId(msg.chat.id.0);
    tracing::debug!(
        chat_id = conversation.0,
        width = photo.width,
        height = photo.height,
        "Photo received"
    );

    if uploader.on_item_arrived(conversation, photo).await == ArrivalOutcome::NotReady {
        tracing::debug!(chat_id = conversation.0, "Photo dropped, Drive not authorized");
    }
    Ok(())
}

/// Picks the largest resolution Telegram offers for a photo.
///
/// Telegram lists sizes smallest first, but the order isn't guaranteed, so
/// compare areas. Ties go to the later entry.
pub fn best_variant(sizes: &[PhotoSize]) -> Option<PhotoRef> {
    sizes
        .iter()
        .map(photo_ref)
        .max_by_key(PhotoRef::pixel_area)
}

fn photo_ref(size: &PhotoSize) -> PhotoRef {
    PhotoRef {
        file_id: size.file.id.clone(),
        unique_id: size.file.unique_id.clone(),
        width: size.width,
        height: size.height,
        size_bytes: Some(size.file.size).filter(|bytes| *bytes > 0),
    }
}
