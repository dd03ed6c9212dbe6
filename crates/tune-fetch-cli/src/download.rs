//! Terminal download session
//!
//! The main thread plays the UI role: it starts the session, prints status
//! updates as they arrive and turns Ctrl-C into a cancel request.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tune_fetch_core::{
    formats, ProgressEvent, SessionController, SessionReport, SessionState, Settings, UiMessage,
    YtDlpFetcher,
};

/// Exit code used when the user interrupted the session
const EXIT_CANCELLED: u8 = 130;

pub fn run(settings: Settings, url: &str, format_index: i64) -> anyhow::Result<ExitCode> {
    let format = formats::lookup(format_index);
    if !formats::is_valid_index(format_index) {
        eprintln!("Unknown format {}, using {}", format_index, format);
    }

    let (ui_sender, ui_receiver) = async_channel::bounded::<UiMessage>(100);
    let fetcher = Arc::new(YtDlpFetcher::from_settings(&settings));
    let mut controller = SessionController::new(settings, fetcher, ui_sender);

    controller
        .start(url, format_index)
        .context("Failed to start download")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create UI runtime")?;
    let report = runtime.block_on(ui_loop(&controller, ui_receiver));

    // Let the background session settle before exiting
    controller.cancel();

    Ok(match report {
        Some(report) => {
            print_summary(&report);
            exit_code(report.state)
        }
        None => ExitCode::FAILURE,
    })
}

async fn ui_loop(
    controller: &SessionController,
    ui_receiver: async_channel::Receiver<UiMessage>,
) -> Option<SessionReport> {
    let mut ctrl_c = Box::pin(tokio::signal::ctrl_c());
    let mut interrupts = 0u8;

    loop {
        tokio::select! {
            msg = ui_receiver.recv() => match msg {
                Ok(UiMessage::Reset) => {}
                Ok(UiMessage::Status(event)) => print_status(&event),
                Ok(UiMessage::Finished(report)) => return Some(report),
                Err(_) => {
                    log::warn!("UI channel closed before the session finished");
                    return None;
                }
            },
            signal = &mut ctrl_c, if interrupts < 2 => {
                ctrl_c = Box::pin(tokio::signal::ctrl_c());
                if let Err(e) = signal {
                    log::warn!("Cannot listen for Ctrl-C: {}", e);
                    interrupts = 2;
                    continue;
                }
                interrupts += 1;
                on_interrupt(controller, interrupts);
            }
        }
    }
}

/// First Ctrl-C lets started downloads finish, the second kills them
fn on_interrupt(controller: &SessionController, count: u8) {
    match count {
        1 => {
            if controller.request_cancel() {
                eprintln!("Cancelling, waiting for running downloads to finish...");
                eprintln!("Press Ctrl-C again to stop them now.");
            }
        }
        _ => {
            if controller.request_abort() {
                eprintln!("Stopping running downloads...");
            }
        }
    }
}

fn print_status(event: &ProgressEvent) {
    match event {
        ProgressEvent::Error { .. } => eprintln!("{}", event.status_text()),
        _ => println!("{}", event.status_text()),
    }
}

fn print_summary(report: &SessionReport) {
    if report.outcomes.is_empty() {
        return;
    }

    println!("{} saved, {} failed", report.succeeded(), report.failed());
    for outcome in &report.outcomes {
        if let Err(message) = &outcome.result {
            println!("  #{} {}", outcome.position, message);
        }
    }
    if let Some(dir) = &report.output_directory {
        println!("Files are in {}", dir.display());
    }
}

fn exit_code(state: SessionState) -> ExitCode {
    match state {
        SessionState::Completed => ExitCode::SUCCESS,
        SessionState::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => ExitCode::FAILURE,
    }
}
