//! Download coordinator
//!
//! Runs one session: resolves the link, then either fetches a single item
//! inline or fans a playlist out over a fixed pool of workers that claim
//! items from a shared queue. Progress is reported through a channel so the
//! coordinator never knows which frontend is listening.
//!
//! Event order per session is `downloading` (at most once, always first),
//! exactly one of `completed`/`cancelled`/`error`, then `finished`. State
//! changes and event emission happen under the same lock, which is what keeps
//! a racing [`Coordinator::cancel`] from producing a second terminal event.

use crate::error::{Error, Result};
use crate::fetcher::{FetchService, OutputSpec};
use crate::formats::{self, OutputFormat};
use crate::types::{
    Item, ItemOutcome, Manifest, ProgressEvent, SessionEvent, SessionReport, SessionState, Settings,
};
use crate::utils::{expand_home, output_dir_name};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Number of concurrent workers for playlist downloads
pub const WORKER_COUNT: usize = 3;

/// One user-initiated download run
#[derive(Debug, Clone)]
struct Session {
    id: uuid::Uuid,
    source_url: String,
    output: OutputSpec,
    started_at: DateTime<Utc>,
}

impl Session {
    fn new(url: &str, format_index: i64, settings: &Settings) -> Self {
        if !formats::is_valid_index(format_index) {
            log::warn!(
                "Format index {} is out of range, using {}",
                format_index,
                formats::lookup(format_index)
            );
        }
        let format: &'static OutputFormat = formats::lookup(format_index);
        let directory = PathBuf::from(expand_home(&settings.download_path))
            .join(output_dir_name(&settings.source_label, format.display_name));

        Self {
            id: uuid::Uuid::new_v4(),
            source_url: url.trim().to_string(),
            output: OutputSpec::new(directory, format),
            started_at: Utc::now(),
        }
    }
}

/// Unclaimed playlist positions.
///
/// Items stay in the shared list; workers only ever take positions out of the
/// queue, each exactly once.
struct WorkQueue {
    items: Vec<Item>,
    pending: Mutex<VecDeque<usize>>,
}

impl WorkQueue {
    fn new(items: Vec<Item>) -> Self {
        let pending = (0..items.len()).collect();
        Self {
            items,
            pending: Mutex::new(pending),
        }
    }

    /// Take the head of the queue unless the session was cancelled
    fn claim(&self, cancelled: &AtomicBool) -> Option<usize> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if cancelled.load(Ordering::Acquire) {
            return None;
        }
        pending.pop_front()
    }

    fn item(&self, position: usize) -> &Item {
        &self.items[position]
    }
}

/// Coordinates a single download session at a time
pub struct Coordinator {
    fetcher: Arc<dyn FetchService>,
    settings: Settings,
    events: async_channel::Sender<SessionEvent>,
    state: Mutex<SessionState>,
    cancelled: Arc<AtomicBool>,
    aborted: watch::Sender<bool>,
}

impl Coordinator {
    pub fn new(
        fetcher: Arc<dyn FetchService>,
        settings: Settings,
        events: async_channel::Sender<SessionEvent>,
    ) -> Self {
        Self {
            fetcher,
            settings,
            events,
            state: Mutex::new(SessionState::Idle),
            cancelled: Arc::new(AtomicBool::new(false)),
            aborted: watch::channel(false).0,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation of the running session.
    ///
    /// Workers stop claiming new items; fetches already in progress run to
    /// completion. Emits `cancelled` right away and returns `false` when no
    /// session is resolving or downloading.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock_state();
        if !state.is_running() {
            log::debug!("Ignoring cancel request in state {}", *state);
            return false;
        }

        self.cancelled.store(true, Ordering::Release);
        *state = SessionState::Cancelled;
        log::info!("Download cancelled");
        self.emit(SessionEvent::Progress(ProgressEvent::Cancelled));
        true
    }

    /// Cancel and also drop the fetches already in progress.
    ///
    /// Dropping a fetch kills its child processes. Items cut short this way
    /// are recorded as failed. Returns `false` when no session is running.
    pub fn abort(&self) -> bool {
        let running = self.cancel() || self.state() == SessionState::Cancelled;
        if running {
            log::warn!("Aborting in-flight downloads");
            self.aborted.send_replace(true);
        }
        running
    }

    /// Run one session to its end.
    ///
    /// Only valid while idle. Session-level failures are reported through the
    /// event channel, not the return value; `Err` means the session never
    /// started.
    pub async fn run(&self, url: &str, format_index: i64) -> Result<SessionReport> {
        self.begin()?;

        let session = Session::new(url, format_index, &self.settings);
        log::info!(
            "Session {} started via {}: {} as {} into {}",
            session.id,
            self.fetcher.name(),
            session.source_url,
            session.output.format,
            session.output.directory.display()
        );

        let mut outcomes = Vec::new();
        match self.download(&session, &mut outcomes).await {
            Ok(()) => self.settle(SessionState::Completed, ProgressEvent::Completed),
            Err(e) => {
                log::error!("Session {} failed: {}", session.id, e);
                self.settle(SessionState::Failed, ProgressEvent::error(e.to_string()));
            }
        }

        Ok(self.finish(session, outcomes))
    }

    async fn download(&self, session: &Session, outcomes: &mut Vec<ItemOutcome>) -> Result<()> {
        let directory = &session.output.directory;
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| Error::Setup(format!("{}: {}", directory.display(), e)))?;

        let mut aborted = self.aborted.subscribe();
        let manifest = tokio::select! {
            manifest = self.fetcher.resolve(&session.source_url) => manifest?,
            _ = aborted_signal(&mut aborted) => {
                return Err(Error::Resolution("Aborted".to_string()));
            }
        };
        log::info!("Resolved {} item(s) from {}", manifest.len(), session.source_url);

        match manifest {
            Manifest::Single(item) => {
                if !self.enter_downloading() {
                    return Ok(());
                }
                let result =
                    fetch_or_abort(self.fetcher.as_ref(), &item, &session.output, &mut aborted).await;
                outcomes.push(outcome(1, &item, &result));
                result.map(|path| log::info!("Saved {}", path.display()))
            }
            Manifest::Collection { items, .. } => {
                let queue = Arc::new(WorkQueue::new(items));
                if !self.enter_downloading() {
                    return Ok(());
                }
                outcomes.extend(self.run_workers(queue, &session.output).await?);
                Ok(())
            }
        }
    }

    /// Spawn the worker pool and wait for every worker to exit
    async fn run_workers(&self, queue: Arc<WorkQueue>, spec: &OutputSpec) -> Result<Vec<ItemOutcome>> {
        let mut workers = JoinSet::new();
        for worker_id in 1..=WORKER_COUNT {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&self.cancelled),
                Arc::clone(&self.fetcher),
                spec.clone(),
                self.aborted.subscribe(),
            ));
        }

        let mut outcomes = Vec::with_capacity(queue.items.len());
        let mut crashed = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(done) => outcomes.extend(done),
                Err(e) => {
                    log::error!("Download worker crashed: {}", e);
                    crashed = Some(e.to_string());
                }
            }
        }
        outcomes.sort_by_key(|o| o.position);

        match crashed {
            Some(message) => Err(Error::Worker(message)),
            None => Ok(outcomes),
        }
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.lock_state();
        if *state != SessionState::Idle {
            return Err(Error::InvalidState(format!("cannot start a session while {}", *state)));
        }
        self.cancelled.store(false, Ordering::Release);
        self.aborted.send_replace(false);
        *state = SessionState::Resolving;
        Ok(())
    }

    /// Move to `Downloading` unless the session was cancelled meanwhile
    fn enter_downloading(&self) -> bool {
        let mut state = self.lock_state();
        if *state != SessionState::Resolving {
            return false;
        }
        *state = SessionState::Downloading;
        self.emit(SessionEvent::Progress(ProgressEvent::Downloading));
        true
    }

    /// Emit the terminal event, unless cancellation already did
    fn settle(&self, terminal: SessionState, event: ProgressEvent) {
        let mut state = self.lock_state();
        if state.is_running() {
            *state = terminal;
            self.emit(SessionEvent::Progress(event));
        }
    }

    fn finish(&self, session: Session, outcomes: Vec<ItemOutcome>) -> SessionReport {
        let mut state = self.lock_state();
        let report = SessionReport {
            session_id: session.id.to_string(),
            source_url: session.source_url,
            state: *state,
            output_directory: Some(session.output.directory),
            outcomes,
            started_at: session.started_at,
            finished_at: Utc::now(),
        };
        log::info!(
            "Session {} {}: {} saved, {} failed",
            report.session_id,
            report.state,
            report.succeeded(),
            report.failed()
        );

        self.emit(SessionEvent::Finished(report.clone()));
        *state = SessionState::Idle;
        report
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events.try_send(event) {
            log::warn!("Dropped session event: {}", e);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<WorkQueue>,
    cancelled: Arc<AtomicBool>,
    fetcher: Arc<dyn FetchService>,
    spec: OutputSpec,
    mut aborted: watch::Receiver<bool>,
) -> Vec<ItemOutcome> {
    let mut outcomes = Vec::new();

    while let Some(position) = queue.claim(&cancelled) {
        let item = queue.item(position);
        log::debug!("Worker {} claimed #{} {}", worker_id, position + 1, item.label());

        let result = fetch_or_abort(fetcher.as_ref(), item, &spec, &mut aborted).await;
        match &result {
            Ok(path) => log::info!("Saved {}", path.display()),
            // One bad item must not stop the rest of the playlist
            Err(e) => log::warn!("Worker {}: {}", worker_id, e),
        }
        outcomes.push(outcome(position + 1, item, &result));
    }

    log::debug!("Worker {} exiting", worker_id);
    outcomes
}

/// Fetch one item unless the session is aborted first
async fn fetch_or_abort(
    fetcher: &dyn FetchService,
    item: &Item,
    spec: &OutputSpec,
    aborted: &mut watch::Receiver<bool>,
) -> Result<PathBuf> {
    tokio::select! {
        result = fetcher.fetch_one(item, spec) => result,
        _ = aborted_signal(aborted) => Err(Error::fetch(item.label(), "aborted")),
    }
}

/// Resolves once the abort flag is raised
async fn aborted_signal(aborted: &mut watch::Receiver<bool>) {
    let closed = aborted.wait_for(|flag| *flag).await.is_err();
    if closed {
        // Coordinator gone, nothing left to abort for
        std::future::pending::<()>().await;
    }
}

fn outcome(position: usize, item: &Item, result: &Result<PathBuf>) -> ItemOutcome {
    ItemOutcome {
        position,
        source_url: item.source_url.clone(),
        title: item.title.clone(),
        result: match result {
            Ok(path) => Ok(path.clone()),
            Err(e) => Err(e.to_string()),
        },
    }
}
