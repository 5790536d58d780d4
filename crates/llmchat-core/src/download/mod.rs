//! Download domain types and events.
//!
//! Pure data types; no I/O. The workflow that mutates these lives in
//! `services::lifecycle`.

pub mod events;
pub mod state;

pub use events::DownloadEvent;
pub use state::DownloadState;
