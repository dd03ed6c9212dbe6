//! Session controller - bridges a frontend's main loop with the coordinator
//!
//! Frontends own the receiving end of a `UiMessage` channel and call
//! [`SessionController::start`] / [`SessionController::cancel`] from their
//! UI thread. All network and filesystem work happens on a background thread
//! running its own tokio runtime.

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::fetcher::FetchService;
use crate::types::{ProgressEvent, SessionEvent, SessionReport, Settings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Messages sent from the controller to the UI (via channel)
#[derive(Debug, Clone)]
pub enum UiMessage {
    /// A new session was accepted, clear any previous status
    Reset,
    /// Session status changed
    Status(ProgressEvent),
    /// Session is over, the start trigger may be enabled again
    Finished(SessionReport),
}

struct ActiveSession {
    coordinator: Arc<Coordinator>,
    handle: JoinHandle<()>,
}

/// Starts and cancels download sessions on behalf of a frontend
pub struct SessionController {
    settings: Settings,
    fetcher: Arc<dyn FetchService>,
    ui_sender: async_channel::Sender<UiMessage>,
    busy: Arc<AtomicBool>,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(
        settings: Settings,
        fetcher: Arc<dyn FetchService>,
        ui_sender: async_channel::Sender<UiMessage>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            ui_sender,
            busy: Arc::new(AtomicBool::new(false)),
            active: None,
        }
    }

    /// Whether a session is running; frontends disable their start trigger
    /// while this is true
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start a session in the background
    pub fn start(&mut self, url: &str, format_index: i64) -> Result<()> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(Error::InvalidInput("Please enter a playlist link.".to_string()));
        }
        if self.is_busy() {
            return Err(Error::SessionActive);
        }
        self.reap();

        let runtime = tokio::runtime::Runtime::new()?;
        let (event_sender, event_receiver) = async_channel::unbounded();
        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&self.fetcher),
            self.settings.clone(),
            event_sender,
        ));

        self.busy.store(true, Ordering::Release);
        if let Err(e) = self.ui_sender.try_send(UiMessage::Reset) {
            log::warn!("Failed to reset UI: {}", e);
        }

        let ui_sender = self.ui_sender.clone();
        let busy = Arc::clone(&self.busy);
        let session = Arc::clone(&coordinator);

        let spawned = std::thread::Builder::new()
            .name("tune-fetch-session".to_string())
            .spawn(move || {
                runtime.block_on(drive_session(
                    session,
                    url,
                    format_index,
                    event_receiver,
                    ui_sender,
                    busy,
                ));
            });

        match spawned {
            Ok(handle) => {
                self.active = Some(ActiveSession { coordinator, handle });
                Ok(())
            }
            Err(e) => {
                self.busy.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Ask the running session to stop without waiting for it
    pub fn request_cancel(&self) -> bool {
        match &self.active {
            Some(active) => active.coordinator.cancel(),
            None => false,
        }
    }

    /// Cancel and kill the fetches already running, without waiting.
    /// For when a cancelled session takes too long to settle.
    pub fn request_abort(&self) -> bool {
        match &self.active {
            Some(active) => active.coordinator.abort(),
            None => false,
        }
    }

    /// Cancel the running session and wait for its background thread to
    /// settle. Called before the host window closes.
    pub fn cancel(&mut self) {
        self.request_cancel();
        if let Some(active) = self.active.take() {
            if active.handle.join().is_err() {
                log::error!("Session thread panicked");
            }
        }
        self.busy.store(false, Ordering::Release);
    }

    /// Join the thread of a session that already finished
    fn reap(&mut self) {
        if let Some(active) = self.active.take() {
            if active.handle.join().is_err() {
                log::error!("Session thread panicked");
            }
        }
    }
}

/// Run one session on the background runtime and relay its events.
///
/// The UI always gets a `Finished` message last, even when the coordinator
/// refuses to start.
async fn drive_session(
    coordinator: Arc<Coordinator>,
    url: String,
    format_index: i64,
    events: async_channel::Receiver<SessionEvent>,
    ui_sender: async_channel::Sender<UiMessage>,
    busy: Arc<AtomicBool>,
) {
    let relay = tokio::spawn(relay_events(events, ui_sender.clone(), Arc::clone(&busy)));

    if let Err(e) = coordinator.run(&url, format_index).await {
        // The relay never sees a finished event in this case
        log::error!("Session did not start: {}", e);
        relay.abort();
        busy.store(false, Ordering::Release);
        let _ = ui_sender.send(UiMessage::Status(ProgressEvent::error(e.to_string()))).await;
        let _ = ui_sender.send(UiMessage::Finished(SessionReport::not_started(url))).await;
        return;
    }

    if let Err(e) = relay.await {
        log::error!("Event relay failed: {}", e);
        busy.store(false, Ordering::Release);
    }
}

/// Forward coordinator events to the UI until the session finishes
async fn relay_events(
    events: async_channel::Receiver<SessionEvent>,
    ui_sender: async_channel::Sender<UiMessage>,
    busy: Arc<AtomicBool>,
) {
    while let Ok(event) = events.recv().await {
        match event {
            SessionEvent::Progress(progress) => {
                if progress.is_terminal() {
                    log::info!("Session status: {}", progress.status_text());
                } else {
                    log::debug!("Session status: {}", progress.status_text());
                }
                let _ = ui_sender.send(UiMessage::Status(progress)).await;
            }
            SessionEvent::Finished(report) => {
                busy.store(false, Ordering::Release);
                let _ = ui_sender.send(UiMessage::Finished(report)).await;
                break;
            }
        }
    }
}
