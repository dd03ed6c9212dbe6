//! Settings database operations

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::Settings;
use crate::utils::expand_home;
use rusqlite::params;

/// Keys accepted by [`SettingsDb::update`]
pub const SETTING_KEYS: [&str; 5] = [
    "download_path",
    "source_label",
    "ytdlp_path",
    "ffmpeg_path",
    "default_format",
];

/// Settings database operations
pub struct SettingsDb;

impl SettingsDb {
    /// Load all settings from database
    pub fn load(db: &Database) -> Result<Settings> {
        let mut settings = Settings::default();

        db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (key, value) = row?;
                match key.as_str() {
                    "download_path" => settings.download_path = expand_home(&value),
                    "source_label" => settings.source_label = value,
                    "ytdlp_path" => settings.ytdlp_path = value,
                    "ffmpeg_path" => settings.ffmpeg_path = value,
                    "default_format" => {
                        settings.default_format = value.parse().unwrap_or(1);
                    }
                    other => log::debug!("Ignoring unknown setting '{}'", other),
                }
            }

            Ok(())
        })?;

        Ok(settings)
    }

    /// Save a single setting
    pub fn set(db: &Database, key: &str, value: &str) -> Result<()> {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                params![key, value],
            )?;
            Ok(())
        })
    }

    /// Validate and save a single user-supplied setting
    pub fn update(db: &Database, key: &str, value: &str) -> Result<()> {
        if !SETTING_KEYS.contains(&key) {
            return Err(Error::InvalidInput(format!(
                "unknown setting '{}', expected one of: {}",
                key,
                SETTING_KEYS.join(", ")
            )));
        }
        if key == "default_format" && value.parse::<i64>().is_err() {
            return Err(Error::InvalidInput(format!(
                "default_format must be a number, got '{}'",
                value
            )));
        }
        Self::set(db, key, value)
    }

    /// Save all settings
    pub fn save(db: &Database, settings: &Settings) -> Result<()> {
        Self::set(db, "download_path", &settings.download_path)?;
        Self::set(db, "source_label", &settings.source_label)?;
        Self::set(db, "ytdlp_path", &settings.ytdlp_path)?;
        Self::set(db, "ffmpeg_path", &settings.ffmpeg_path)?;
        Self::set(db, "default_format", &settings.default_format.to_string())?;
        Ok(())
    }

    /// Get a single setting value
    pub fn get(db: &Database, key: &str) -> Result<Option<String>> {
        db.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            );

            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}
