pub mod batch_uploader;
pub mod upload_models;
pub mod upload_ports;

pub use batch_uploader::{BatchUploader, DEFAULT_QUIET_PERIOD};
pub use upload_models::{ArrivalOutcome, ConversationId, PhotoRef, UploadedFile};
pub use upload_ports::{ChatNotifier, FileStorage, GatewayError, PhotoSource, StorageError};
