//! yt-dlp + ffmpeg backed fetch service

use super::{validate_url, FetchService, OutputSpec};
use crate::error::{Error, Result};
use crate::types::{Item, Manifest, Settings};
use crate::utils::{last_error_line, sanitize_filename};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// Files are downloaded here before being transcoded into the output directory
const STAGING_DIR: &str = ".partial";

/// Metadata document printed by `yt-dlp -J`
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    /// Present only for playlists and other collections
    entries: Option<Vec<Option<EntryJson>>>,
}

/// Flat playlist entry
#[derive(Debug, Deserialize)]
struct EntryJson {
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
}

/// Fetch service driving the `yt-dlp` and `ffmpeg` executables
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    ytdlp_path: PathBuf,
    ffmpeg_path: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(ytdlp_path: impl Into<PathBuf>, ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.ytdlp_path, &settings.ffmpeg_path)
    }

    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        log::debug!("Running {} {}", program.display(), args.join(" "));
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);
        // A terminal Ctrl-C goes to the foreground process group. Started
        // fetches must outlive a cancel request, so keep them out of it.
        #[cfg(unix)]
        command.process_group(0);
        command.output().await
    }

    /// Download the best source stream into the staging directory.
    /// Returns the downloaded file and the title reported by yt-dlp.
    async fn download_source(
        &self,
        item: &Item,
        spec: &OutputSpec,
        staging: &Path,
        token: &str,
    ) -> Result<(PathBuf, Option<String>)> {
        let args = download_args(&item.source_url, spec, staging, token);
        let output = self
            .run(&self.ytdlp_path, &args)
            .await
            .map_err(|e| Error::fetch(item.label(), format!("cannot run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let message = last_error_line(&output.stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(Error::fetch(item.label(), message));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        let path = lines
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| Error::fetch(item.label(), "yt-dlp did not report a file"))?;
        let title = lines.next().map(String::from).filter(|t| t != "NA");

        Ok((path, title))
    }

    async fn transcode(&self, item: &Item, source: &Path, target: &Path, codec: &str) -> Result<()> {
        let args = transcode_args(source, target, codec);
        let output = self
            .run(&self.ffmpeg_path, &args)
            .await
            .map_err(|e| Error::fetch(item.label(), format!("cannot run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let message = last_error_line(&output.stderr)
                .unwrap_or_else(|| format!("ffmpeg exited with {}", output.status));
            return Err(Error::fetch(item.label(), format!("transcode failed: {}", message)));
        }
        Ok(())
    }
}

#[async_trait]
impl FetchService for YtDlpFetcher {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str) -> Result<Manifest> {
        let url = validate_url(url)?;
        let args = resolve_args(url.as_str());

        let output = self.run(&self.ytdlp_path, &args).await.map_err(|e| {
            Error::Resolution(format!(
                "Error extracting playlist info: cannot run {}: {}",
                self.ytdlp_path.display(),
                e
            ))
        })?;

        if !output.status.success() {
            let message = last_error_line(&output.stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(Error::Resolution(format!(
                "Error extracting playlist info: {}",
                message
            )));
        }

        parse_manifest(url.as_str(), &output.stdout)
    }

    async fn fetch_one(&self, item: &Item, spec: &OutputSpec) -> Result<PathBuf> {
        let staging = spec.directory.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| Error::fetch(item.label(), format!("cannot create {}: {}", staging.display(), e)))?;

        // Workers share the staging directory, so every fetch gets its own names
        let token = uuid::Uuid::new_v4().simple().to_string();
        let (source, reported_title) = match self.download_source(item, spec, &staging, &token).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                let _ = tokio::fs::remove_dir(&staging).await;
                return Err(e);
            }
        };

        let stem = item
            .title
            .as_deref()
            .or(reported_title.as_deref())
            .map(sanitize_filename)
            .unwrap_or_else(|| token.clone());
        let target = spec.file_path(&stem);
        let partial = spec
            .directory
            .join(format!(".{}.part.{}", token, spec.format.file_extension));

        let result = match self
            .transcode(item, &source, &partial, spec.format.target_codec)
            .await
        {
            Ok(()) => tokio::fs::rename(&partial, &target)
                .await
                .map(|_| target)
                .map_err(|e| Error::fetch(item.label(), format!("cannot move output into place: {}", e))),
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        if let Err(e) = tokio::fs::remove_file(&source).await {
            log::debug!("Could not remove staged source {}: {}", source.display(), e);
        }
        // Only succeeds once the last worker is done with it
        let _ = tokio::fs::remove_dir(&staging).await;

        result
    }
}

fn resolve_args(url: &str) -> Vec<String> {
    ["-J", "--flat-playlist", "--no-warnings", url]
        .into_iter()
        .map(String::from)
        .collect()
}

fn download_args(url: &str, spec: &OutputSpec, staging: &Path, token: &str) -> Vec<String> {
    let template = staging.join(format!("{}.%(ext)s", token));
    vec![
        "-f".to_string(),
        spec.format.source_selector.to_string(),
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "--no-warnings".to_string(),
        "--no-simulate".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "--print".to_string(),
        "after_move:title".to_string(),
        "-o".to_string(),
        template.to_string_lossy().to_string(),
        url.to_string(),
    ]
}

fn transcode_args(source: &Path, target: &Path, codec: &str) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-vn".to_string(),
        "-acodec".to_string(),
        codec.to_string(),
        target.to_string_lossy().to_string(),
    ]
}

/// Turn `yt-dlp -J` output into a manifest.
///
/// Only a document carrying `entries` is a collection; anything else is a
/// single item.
fn parse_manifest(requested_url: &str, json: &[u8]) -> Result<Manifest> {
    let info: InfoJson = serde_json::from_slice(json).map_err(|e| {
        Error::Resolution(format!("Error extracting playlist info: unreadable metadata: {}", e))
    })?;

    match info.entries {
        Some(entries) => {
            let items = entries
                .into_iter()
                .enumerate()
                .filter_map(|(i, entry)| {
                    let entry = entry?;
                    match entry.url.or(entry.webpage_url) {
                        Some(url) => Some(Item::new(url, entry.title)),
                        None => {
                            log::warn!("Skipping playlist entry {} without a URL", i + 1);
                            None
                        }
                    }
                })
                .collect();

            Ok(Manifest::Collection {
                title: info.title,
                items,
            })
        }
        None => {
            let url = info
                .webpage_url
                .or(info.original_url)
                .unwrap_or_else(|| requested_url.to_string());
            Ok(Manifest::Single(Item::new(url, info.title)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats;

    #[test]
    fn test_parse_playlist_manifest() {
        let json = br#"{
            "_type": "playlist",
            "title": "Road Trip",
            "entries": [
                {"_type": "url", "url": "https://www.youtube.com/watch?v=a1", "title": "First"},
                null,
                {"_type": "url", "url": "https://www.youtube.com/watch?v=b2", "title": null},
                {"_type": "url", "title": "No link"},
                {"_type": "url", "webpage_url": "https://www.youtube.com/watch?v=c3", "title": "Third"}
            ]
        }"#;

        let manifest = parse_manifest("https://www.youtube.com/playlist?list=PL1", json).unwrap();
        match manifest {
            Manifest::Collection { title, items } => {
                assert_eq!(title.as_deref(), Some("Road Trip"));
                let urls: Vec<_> = items.iter().map(|i| i.source_url.as_str()).collect();
                assert_eq!(
                    urls,
                    vec![
                        "https://www.youtube.com/watch?v=a1",
                        "https://www.youtube.com/watch?v=b2",
                        "https://www.youtube.com/watch?v=c3",
                    ]
                );
                assert_eq!(items[0].title.as_deref(), Some("First"));
                assert_eq!(items[1].title, None);
            }
            other => panic!("expected collection, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_playlist_is_still_a_collection() {
        let manifest = parse_manifest("https://x.test/list", br#"{"title":"Empty","entries":[]}"#).unwrap();
        assert_eq!(
            manifest,
            Manifest::Collection {
                title: Some("Empty".into()),
                items: vec![]
            }
        );
    }

    #[test]
    fn test_parse_single_video_manifest() {
        let json = br#"{"id":"a1","title":"Only Song","webpage_url":"https://www.youtube.com/watch?v=a1"}"#;
        let manifest = parse_manifest("https://youtu.be/a1", json).unwrap();
        assert_eq!(
            manifest,
            Manifest::Single(Item::new(
                "https://www.youtube.com/watch?v=a1",
                Some("Only Song".into())
            ))
        );

        let manifest = parse_manifest("https://youtu.be/a1", br#"{"id":"a1"}"#).unwrap();
        assert_eq!(manifest, Manifest::Single(Item::new("https://youtu.be/a1", None)));
    }

    #[test]
    fn test_parse_garbage_is_resolution_error() {
        let err = parse_manifest("https://x.test", b"<html>").unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_download_args_use_format_selector() {
        let spec = OutputSpec::new("/out", formats::lookup(1));
        let args = download_args("https://x.test/v", &spec, Path::new("/out/.partial"), "tok");
        let pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[pos + 1], "bestaudio[ext=m4a]/best");
        assert!(args.contains(&"/out/.partial/tok.%(ext)s".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://x.test/v"));
    }

    #[test]
    fn test_transcode_args_use_target_codec() {
        let args = transcode_args(Path::new("in.webm"), Path::new("out.mp3"), "libmp3lame");
        let pos = args.iter().position(|a| a == "-acodec").unwrap();
        assert_eq!(args[pos + 1], "libmp3lame");
        assert!(args.contains(&"-vn".to_string()));
    }

    #[test]
    fn test_resolve_args_are_metadata_only() {
        let args = resolve_args("https://x.test/list");
        assert!(args.contains(&"-J".to_string()));
        assert!(args.contains(&"--flat-playlist".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_rejects_invalid_url_without_running_ytdlp() {
        let fetcher = YtDlpFetcher::new("/nonexistent/yt-dlp", "/nonexistent/ffmpeg");
        let err = fetcher.resolve("definitely not a link").await.unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_resolution_error() {
        let fetcher = YtDlpFetcher::new("/nonexistent/yt-dlp", "/nonexistent/ffmpeg");
        let err = fetcher.resolve("https://example.com/list").await.unwrap_err();
        match err {
            Error::Resolution(message) => assert!(message.contains("cannot run")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[cfg(target_os = "linux")]
    fn install_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Fields 1 and 5 of `/proc/<pid>/stat` written by the fake yt-dlp
    #[cfg(target_os = "linux")]
    fn pid_and_group(stat: &str) -> (String, String) {
        let mut fields = stat.split_whitespace();
        let pid = fields.next().unwrap().to_string();
        let group = fields.next().unwrap().to_string();
        (pid, group)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_fetch_runs_tools_in_their_own_process_group() {
        let bin = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let marker = bin.path().join("ytdlp.stat");

        // Prints the file path and title the way `--print after_move:...` does
        let ytdlp_script = r#"#!/bin/sh
awk '{print $1, $5}' /proc/$$/stat > "MARKER"
template=""
while [ $# -gt 0 ]; do
    if [ "$1" = "-o" ]; then template="$2"; shift; fi
    shift
done
file=$(printf '%s' "$template" | sed 's/%(ext)s/webm/')
printf 'audio' > "$file"
echo "$file"
echo "Reported Title"
"#
        .replace("MARKER", &marker.to_string_lossy());
        let ytdlp = install_script(bin.path(), "yt-dlp", &ytdlp_script);
        // Arguments end with: -i <source> -vn -acodec <codec> <target>
        let ffmpeg = install_script(bin.path(), "ffmpeg", "#!/bin/sh\ncp \"$6\" \"${10}\"\n");

        let fetcher = YtDlpFetcher::new(ytdlp, ffmpeg);
        let spec = OutputSpec::new(out.path(), formats::lookup(2));
        let item = Item::new("https://example.com/watch?v=1", None);

        let saved = fetcher.fetch_one(&item, &spec).await.unwrap();
        assert_eq!(saved, out.path().join("Reported Title.mp3"));
        assert_eq!(std::fs::read(&saved).unwrap(), b"audio");
        assert!(!out.path().join(STAGING_DIR).exists());

        // Leading its own group means a terminal SIGINT aimed at ours misses it
        let (pid, group) = pid_and_group(&std::fs::read_to_string(&marker).unwrap());
        let own = std::fs::read_to_string("/proc/self/stat").unwrap();
        let own_group = own.rsplit(')').next().unwrap().split_whitespace().nth(2).unwrap();
        assert_eq!(pid, group);
        assert_ne!(group, own_group);
    }

    #[tokio::test]
    async fn test_missing_binary_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = YtDlpFetcher::new("/nonexistent/yt-dlp", "/nonexistent/ffmpeg");
        let spec = OutputSpec::new(dir.path(), formats::lookup(2));
        let item = Item::new("https://example.com/v/1", Some("Song".into()));

        let err = fetcher.fetch_one(&item, &spec).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert!(!spec.file_path("Song").exists());
    }
}
