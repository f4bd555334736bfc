// The infra module contains implementations of core traits.
// Each external service gets its own submodule.

#[path = "google_drive/mod.rs"]
pub mod google_drive;
