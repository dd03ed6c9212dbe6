//! Audio output format catalog
//!
//! The catalog is a fixed table. Frontends present it as a 1-based numbered
//! list and hand the chosen number back to the coordinator.

use serde::Serialize;

/// One selectable audio output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputFormat {
    /// Name shown to the user, also used in the output folder name
    pub display_name: &'static str,
    /// Extension of the produced files, without the dot
    pub file_extension: &'static str,
    /// yt-dlp format selector for the source stream
    pub source_selector: &'static str,
    /// ffmpeg audio codec used for the final file
    pub target_codec: &'static str,
}

impl OutputFormat {
    const fn new(
        display_name: &'static str,
        file_extension: &'static str,
        source_selector: &'static str,
        target_codec: &'static str,
    ) -> Self {
        Self {
            display_name,
            file_extension,
            source_selector,
            target_codec,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

static AUDIO_FORMATS: [OutputFormat; 10] = [
    OutputFormat::new("M4A", "m4a", "bestaudio[ext=m4a]/best", "aac"),
    OutputFormat::new("MP3", "mp3", "bestaudio/best", "libmp3lame"),
    OutputFormat::new("WAV", "wav", "bestaudio/best", "pcm_s16le"),
    OutputFormat::new("FLAC", "flac", "bestaudio/best", "flac"),
    OutputFormat::new("AAC", "aac", "bestaudio/best", "aac"),
    OutputFormat::new("OPUS", "opus", "bestaudio/best", "libopus"),
    OutputFormat::new("VORBIS", "ogg", "bestaudio/best", "libvorbis"),
    OutputFormat::new("ALAC", "m4a", "bestaudio/best", "alac"),
    OutputFormat::new("AC3", "ac3", "bestaudio/best", "ac3"),
    OutputFormat::new("DTS", "dts", "bestaudio/best", "dts"),
];

/// The full catalog in display order
pub fn catalog() -> &'static [OutputFormat] {
    &AUDIO_FORMATS
}

/// Look up a format by its 1-based index.
///
/// Any index outside `1..=N` yields the first entry.
pub fn lookup(index: i64) -> &'static OutputFormat {
    usize::try_from(index)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| AUDIO_FORMATS.get(i))
        .unwrap_or(&AUDIO_FORMATS[0])
}

/// Whether `index` names a catalog entry rather than the fallback
pub fn is_valid_index(index: i64) -> bool {
    (1..=AUDIO_FORMATS.len() as i64).contains(&index)
}

/// Numbered names for a format picker, e.g. "1. M4A"
pub fn format_names() -> Vec<String> {
    AUDIO_FORMATS
        .iter()
        .enumerate()
        .map(|(i, format)| format!("{}. {}", i + 1, format.display_name))
        .collect()
}
