//! Tune-Fetch Core Library
//!
//! This crate provides the format catalog, the media fetch service adapter,
//! the download coordinator and the session controller for the Tune-Fetch
//! playlist audio downloader. It is UI-agnostic and can be used with any
//! frontend (GTK, terminal, etc.)

pub mod controller;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod formats;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use controller::{SessionController, UiMessage};
pub use coordinator::{Coordinator, WORKER_COUNT};
pub use db::{get_db_path, init_database, Database, SettingsDb, SETTING_KEYS};
pub use error::{Error, Result};
pub use fetcher::{validate_url, FetchService, OutputSpec, YtDlpFetcher};
pub use formats::{format_names, OutputFormat};
pub use types::*;
