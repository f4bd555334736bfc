// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "uploads/mod.rs"]
pub mod uploads;
