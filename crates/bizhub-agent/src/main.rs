//! # bizhub-agent
//!
//! Wakes the bizhub backend from the command line and, in `watch` mode,
//! keeps it awake until interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bizhub_client::{
    Endpoints, HttpProbe, TrackerConfig, VisitorTracker, WarmupConfig, WarmupManager,
    build_client,
};
use bizhub_core::JsonFileStore;
use bizhub_logging::LogFormat;
use bizhub_settings::BizhubSettings;
use clap::{Parser, Subcommand};

/// bizhub backend warm-up agent.
#[derive(Parser, Debug)]
#[command(name = "bizhub-agent", about = "Wake and keep alive the bizhub backend")]
struct Cli {
    /// Backend origin (overrides settings).
    #[arg(long)]
    base_url: Option<String>,

    /// Settings file (defaults to `~/.bizhub/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Run the first-load warm-up and exit.
    Wake,
    /// Send one ping and exit.
    Ping,
    /// Warm up, then keep the backend awake until ctrl-c.
    Watch {
        /// Report a page view for this path once the backend is up.
        #[arg(long)]
        page: Option<String>,

        /// Referrer sent with `--page`.
        #[arg(long, requires = "page")]
        referrer: Option<String>,
    },
}

fn load(cli: &Cli) -> Result<BizhubSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(bizhub_settings::settings_path);
    let mut settings = bizhub_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(url) = &cli.base_url {
        settings.server.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    settings.validate().context("Invalid command-line override")?;
    Ok(settings)
}

fn endpoints(settings: &BizhubSettings) -> Endpoints {
    Endpoints {
        wake_path: settings.server.wake_path.clone(),
        ping_path: settings.server.ping_path.clone(),
        ..Endpoints::new(settings.server.origin())
    }
}

fn warmup_config(settings: &BizhubSettings) -> WarmupConfig {
    WarmupConfig {
        wake: settings.wake.clone(),
        keep_alive: settings.keep_alive.clone(),
        init: settings.init.clone(),
    }
}

fn tracker_config(settings: &BizhubSettings) -> TrackerConfig {
    TrackerConfig {
        enabled: settings.analytics.enabled,
        session_timeout: Duration::from_millis(settings.analytics.session_timeout_ms),
        request_timeout: Duration::from_millis(settings.analytics.request_timeout_ms),
    }
}

fn session_store_path(data_dir: &Path, settings: &BizhubSettings) -> PathBuf {
    data_dir.join(&settings.analytics.store_file)
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let format = LogFormat::parse(&settings.logging.format).unwrap_or_default();
    bizhub_logging::init_subscriber(&settings.logging.level, format);

    let client = build_client();
    let endpoints = endpoints(&settings);
    tracing::debug!(base_url = %endpoints.base_url, "using backend");
    let probe = Arc::new(HttpProbe::with_client(client.clone(), endpoints));
    let manager = WarmupManager::with_config(probe, warmup_config(&settings));

    match cli.command {
        Command::Wake => {
            let awake = manager.initialize_server().await;
            manager.stop_keep_alive();
            Ok(exit_code(awake))
        }
        Command::Ping => Ok(exit_code(manager.ping().await)),
        Command::Watch { page, referrer } => {
            let awake = manager.initialize_server().await;
            if !awake {
                tracing::warn!("backend not confirmed awake, keep-alive will retry");
                manager.start_keep_alive();
            }

            if let Some(page) = page {
                let store_path = session_store_path(&bizhub_settings::data_dir(), &settings);
                let tracker = VisitorTracker::new(
                    client,
                    settings.server.visit_url(),
                    Arc::new(JsonFileStore::open(store_path)),
                    tracker_config(&settings),
                );
                let _ = tracker.track_page_view(&page, referrer.as_deref()).await;
            }

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl-c")?;

            tracing::info!(phase = %manager.phase(), "shutting down");
            manager.stop_keep_alive();
            Ok(ExitCode::SUCCESS)
        }
    }
}
