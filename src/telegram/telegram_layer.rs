// Telegram layer - adapters between the Bot API and the core upload pipeline.

#[path = "gateway.rs"]
pub mod gateway;

#[path = "photo_handler.rs"]
pub mod photo_handler;

pub use gateway::TelegramGateway;
pub use photo_handler::run_dispatcher;
