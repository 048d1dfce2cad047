//! External service integrations.

pub mod roster_sync;

pub use roster_sync::HttpRosterSync;
