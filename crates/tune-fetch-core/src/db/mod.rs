//! Database module - SQLite persistence for settings

mod connection;
mod settings;

pub use connection::{get_db_path, init_database, Database};
pub use settings::{SettingsDb, SETTING_KEYS};
