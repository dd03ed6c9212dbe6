//! Types module - data structures for Tune-Fetch
//!
//! These types define the data models shared by the coordinator, the
//! session controller and the frontends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One downloadable media resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub source_url: String,
    pub title: Option<String>,
}

impl Item {
    pub fn new(source_url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            source_url: source_url.into(),
            title,
        }
    }

    /// Title if known, otherwise the source URL
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.source_url)
    }
}

/// What a URL resolved to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Manifest {
    Single(Item),
    Collection {
        title: Option<String>,
        items: Vec<Item>,
    },
}

impl Manifest {
    pub fn len(&self) -> usize {
        match self {
            Manifest::Single(_) => 1,
            Manifest::Collection { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Status updates delivered to the UI.
///
/// Serialized as `{"status": "...", "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Downloading,
    Completed,
    Cancelled,
    Error { message: String },
}

impl ProgressEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            message: message.into(),
        }
    }

    /// Completed, cancelled and error end a session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Downloading)
    }

    /// Text for the status line of a frontend
    pub fn status_text(&self) -> String {
        match self {
            ProgressEvent::Downloading => "Downloading...".to_string(),
            ProgressEvent::Completed => "Download finished!".to_string(),
            ProgressEvent::Cancelled => "Download cancelled.".to_string(),
            ProgressEvent::Error { message } => format!("Error: {}", message),
        }
    }
}

/// Everything a coordinator emits during one session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress(ProgressEvent),
    /// Always the last event of a session, sent exactly once
    Finished(SessionReport),
}

/// Coordinator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Resolving,
    Downloading,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    /// Resolving or downloading
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Resolving | SessionState::Downloading)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Resolving => write!(f, "resolving"),
            SessionState::Downloading => write!(f, "downloading"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Cancelled => write!(f, "cancelled"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Result of fetching one item
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    /// 1-based position in the source
    pub position: usize,
    pub source_url: String,
    pub title: Option<String>,
    pub result: Result<PathBuf, String>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary handed out with the finished notification
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub source_url: String,
    /// Terminal state the session reached
    pub state: SessionState,
    pub output_directory: Option<PathBuf>,
    pub outcomes: Vec<ItemOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    /// Report for a session that was refused before it did any work
    pub fn not_started(source_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            source_url: source_url.into(),
            state: SessionState::Failed,
            output_directory: None,
            outcomes: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root under which per-format folders are created
    pub download_path: String,
    /// Prefix of the per-format folder name
    pub source_label: String,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    /// Preselected 1-based catalog index
    pub default_format: i64,
}

impl Default for Settings {
    fn default() -> Self {
        let download_path = dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join("Downloads"))
            .to_string_lossy()
            .to_string();

        Self {
            download_path,
            source_label: "YouTube Playlist".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            default_format: 1,
        }
    }
}
