//! Test doubles shared by the coordinator and controller tests

use crate::error::{Error, Result};
use crate::fetcher::{FetchService, OutputSpec};
use crate::types::{Item, Manifest, ProgressEvent, SessionEvent, SessionReport, Settings};
use crate::utils::sanitize_filename;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Fetch service with a fixed manifest that writes empty files
pub struct ScriptedFetcher {
    manifest: std::result::Result<Manifest, String>,
    failing: HashSet<String>,
    gate_fetch: bool,
    gate_resolve: bool,
    gate: watch::Sender<bool>,
    calls: Mutex<Vec<String>>,
    resolves: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(manifest: Manifest) -> Self {
        Self::with_manifest(Ok(manifest))
    }

    pub fn unresolvable(message: &str) -> Self {
        Self::with_manifest(Err(message.to_string()))
    }

    fn with_manifest(manifest: std::result::Result<Manifest, String>) -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            manifest,
            failing: HashSet::new(),
            gate_fetch: false,
            gate_resolve: false,
            gate,
            calls: Mutex::new(Vec::new()),
            resolves: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fetching this URL fails
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Fetches block until [`ScriptedFetcher::open_gate`]
    pub fn gated(mut self) -> Self {
        self.gate_fetch = true;
        self
    }

    /// Resolution blocks until [`ScriptedFetcher::open_gate`]
    pub fn gated_resolve(mut self) -> Self {
        self.gate_resolve = true;
        self
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, count: usize) {
        wait_until(|| self.calls.lock().unwrap().len() >= count).await;
    }

    pub async fn wait_for_resolve(&self) {
        wait_until(|| self.resolve_count() > 0).await;
    }

    async fn pass_gate(&self) {
        let mut rx = self.gate.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

#[async_trait]
impl FetchService for ScriptedFetcher {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn resolve(&self, _url: &str) -> Result<Manifest> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.gate_resolve {
            self.pass_gate().await;
        }
        self.manifest.clone().map_err(Error::Resolution)
    }

    async fn fetch_one(&self, item: &Item, spec: &OutputSpec) -> Result<PathBuf> {
        self.calls.lock().unwrap().push(item.source_url.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.gate_fetch {
            self.pass_gate().await;
        }
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&item.source_url) {
            return Err(Error::fetch(item.label(), "scripted failure"));
        }

        let stem = sanitize_filename(item.title.as_deref().unwrap_or("untitled"));
        let path = spec.file_path(&stem);
        tokio::fs::write(&path, b"").await?;
        Ok(path)
    }
}

/// Playlist of `count` titled items
pub fn playlist(count: usize) -> Manifest {
    Manifest::Collection {
        title: Some("Playlist".to_string()),
        items: (1..=count)
            .map(|n| {
                Item::new(
                    format!("https://example.com/watch?v={}", n),
                    Some(format!("Track {}", n)),
                )
            })
            .collect(),
    }
}

/// Default settings writing below `root`
pub fn settings_in(root: &Path) -> Settings {
    Settings {
        download_path: root.to_string_lossy().to_string(),
        ..Settings::default()
    }
}

/// Receive events until `finished`, returning the status events seen
pub async fn collect_session(
    rx: &async_channel::Receiver<SessionEvent>,
) -> (Vec<ProgressEvent>, SessionReport) {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(WAIT_LIMIT, rx.recv())
            .await
            .expect("timed out waiting for session events")
            .expect("event channel closed");
        match event {
            SessionEvent::Progress(p) => events.push(p),
            SessionEvent::Finished(report) => return (events, report),
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
