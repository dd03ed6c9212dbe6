//! Utility functions for Tune-Fetch

use std::path::PathBuf;

const MAX_FILENAME_CHARS: usize = 200;

/// Make a media title safe to use as a file name on every platform
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    // Leading dots would hide the file, trailing dots and spaces break Windows
    let trimmed = cleaned
        .trim()
        .trim_start_matches('.')
        .trim_end_matches(['.', ' '])
        .trim();

    let name: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();
    if name.is_empty() {
        "untitled".to_string()
    } else {
        name
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().to_string();
        }
    }
    path.to_string()
}

/// Folder name for one format, e.g. "YouTube Playlist MP3"
pub fn output_dir_name(source_label: &str, format_name: &str) -> String {
    let label = source_label.trim();
    if label.is_empty() {
        format_name.to_string()
    } else {
        sanitize_filename(&format!("{} {}", label, format_name))
    }
}

/// Last non-empty line of a process' stderr, used as the error message
pub fn last_error_line(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .map(|l| l.strip_prefix("ERROR: ").unwrap_or(l).to_string())
}

/// Application data directory
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tune-fetch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("AC/DC - Back in Black"), "AC_DC - Back in Black");
        assert_eq!(sanitize_filename("What? Why: \"Now\""), "What_ Why_ _Now_");
        assert_eq!(sanitize_filename("..hidden"), "hidden");
        assert_eq!(sanitize_filename("trailing. "), "trailing");
        assert_eq!(sanitize_filename("line\nbreak"), "line_break");
        assert_eq!(sanitize_filename("   "), "untitled");
        assert_eq!(sanitize_filename("..."), "untitled");
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_filename(&long).chars().count(), MAX_FILENAME_CHARS);
    }

    #[test]
    fn test_output_dir_name() {
        assert_eq!(output_dir_name("YouTube Playlist", "MP3"), "YouTube Playlist MP3");
        assert_eq!(output_dir_name("", "FLAC"), "FLAC");
    }

    #[test]
    fn test_last_error_line() {
        let stderr = b"WARNING: something\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(
            last_error_line(stderr).as_deref(),
            Some("[youtube] abc: Video unavailable")
        );
        assert_eq!(last_error_line(b""), None);
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/music"), "/tmp/music");
    }
}
