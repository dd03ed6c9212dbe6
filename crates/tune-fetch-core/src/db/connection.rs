//! Database connection management

use crate::error::{Error, Result};
use crate::utils::data_dir;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SCHEMA: &str = include_str!("../../../../migrations/001_initial.sql");

/// Get the database path
pub fn get_db_path() -> PathBuf {
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("tune-fetch.db")
}

/// Initialize the database at the default location
pub fn init_database() -> Result<Database> {
    Database::open(&get_db_path())
}

/// Database wrapper with thread-safe connection
#[derive(Clone, Debug)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a database file and apply the schema
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Initializing database at: {:?}", path);
        Self::with_schema(Connection::open(path)?)
    }

    /// Throwaway database, used by tests and when the data dir is unusable
    pub fn open_in_memory() -> Result<Self> {
        Self::with_schema(Connection::open_in_memory()?)
    }

    fn with_schema(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Execute a function with the database connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| {
            Error::Database(format!("Failed to lock database: {}", e))
        })?;
        f(&conn).map_err(Into::into)
    }
}
