//! Tune-Fetch CLI - terminal frontend for the Tune-Fetch playlist audio downloader

mod args;
mod download;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tune_fetch_core::{format_names, init_database, Database, Settings, SettingsDb, SETTING_KEYS};

use args::{Cli, Command, ConfigAction};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    log::debug!("Starting Tune-Fetch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Formats => {
            for name in format_names() {
                println!("{}", name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { action } => {
            let db = init_database().context("Failed to open settings database")?;
            match action {
                ConfigAction::Show => show_settings(&SettingsDb::load(&db)?),
                ConfigAction::Set { key, value } => {
                    SettingsDb::update(&db, &key, &value)?;
                    println!("{} = {}", key, value);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Download {
            url,
            format,
            output,
        } => {
            let mut settings = load_settings();
            if let Some(dir) = output {
                settings.download_path = dir.to_string_lossy().to_string();
            }
            let format_index = format.unwrap_or(settings.default_format);
            download::run(settings, &url, format_index)
        }
    }
}

/// Load persisted settings, falling back to defaults
fn load_settings() -> Settings {
    let loaded = init_database()
        .or_else(|e| {
            log::warn!("Failed to open settings database, using a temporary one: {}", e);
            Database::open_in_memory()
        })
        .and_then(|db| SettingsDb::load(&db));

    match loaded {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Failed to load settings, using defaults: {}", e);
            Settings::default()
        }
    }
}

fn show_settings(settings: &Settings) {
    for key in SETTING_KEYS {
        let value = match key {
            "download_path" => settings.download_path.clone(),
            "source_label" => settings.source_label.clone(),
            "ytdlp_path" => settings.ytdlp_path.clone(),
            "ffmpeg_path" => settings.ffmpeg_path.clone(),
            "default_format" => settings.default_format.to_string(),
            _ => continue,
        };
        println!("{} = {}", key, value);
    }
}
