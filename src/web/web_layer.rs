// Web layer - the small HTTP surface used to authorize Google Drive access.

#[path = "auth_routes.rs"]
pub mod auth_routes;

#[path = "pages.rs"]
pub mod pages;

pub use auth_routes::{router, WebState};
