// Upload domain models - plain data passed between the bot layer and the batch uploader.
//
// Nothing in here knows about Telegram or Google Drive. The bot layer converts
// platform types into these, and the infra layer only ever sees bytes + a filename.

use std::fmt;

/// Content type every photo is uploaded with. Telegram re-encodes photos as JPEG.
pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

/// Identifies the chat a photo arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a photo that still lives on the messaging platform.
///
/// Holds enough to download the bytes later; the bytes themselves are only
/// fetched when the batch settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    /// Platform id used to request a download.
    pub file_id: String,
    /// Platform id that stays stable across bots, used in the stored filename.
    pub unique_id: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: Option<u32>,
}

impl PhotoRef {
    /// Name the photo is stored under: `telegram_{chat}_{unique_id}.jpg`.
    pub fn storage_filename(&self, conversation: ConversationId) -> String {
        format!("telegram_{}_{}.jpg", conversation, self.unique_id)
    }

    pub fn pixel_area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A file successfully created in the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
}

/// Aggregate result of one settled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub succeeded: usize,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

/// What happened to a single arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// The photo joined the conversation's pending batch.
    Queued,
    /// Storage isn't authorized yet; the user was told and nothing was queued.
    NotReady,
}

/// User-facing texts. Exactly two are sent per settled batch.
pub mod replies {
    pub const NOT_READY: &str = "Google Drive isn't connected yet. \
        Finish the authorization step first, then send your photos again.";

    pub fn batch_received(count: usize) -> String {
        format!(
            "Received {} {}. Uploading to Google Drive...",
            count,
            photo_noun(count)
        )
    }

    pub fn batch_done(succeeded: usize, attempted: usize) -> String {
        format!(
            "Done! {} of {} {} uploaded to Google Drive.",
            succeeded,
            attempted,
            photo_noun(attempted)
        )
    }

    fn photo_noun(count: usize) -> &'static str {
        if count == 1 {
            "photo"
        } else {
            "photos"
        }
    }
}
