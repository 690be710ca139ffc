//! modsync - Install and uninstall audio plugins locally and on MOD devices
//!
//! Command-line front end of the synchronization workflow.
//!
//! # Execution Flow
//!
//! 1. Parse the command line
//! 2. Load `Settings.yaml` from the config directory, with `MODSYNC__*` overrides
//! 3. Initialize logging → `<config dir>/logs/modsync.<date>`
//! 4. Build the SSH shell, the release source and the device transport
//! 5. Run the command through [`SyncController`]
//! 6. Print notifications and, if the device was unreachable, a reconnect hint
//!
//! The exit code is non-zero when the command did not succeed.

use anyhow::{Context, Result};
use clap::Parser;
use modsync::cli::{Cli, Commands};
use modsync::services::folders::default_plugin_folder;
use modsync::services::{DeviceTransport, GithubReleases, RemoteShell, SshShell};
use modsync::state::{NotificationLevel, StateChange, event_capacity_for};
use modsync::{
    APP_NAME, ConfigManager, Mode, PluginFormat, SessionState, StateManager, SyncController,
    SyncMetrics, VERSION,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<bool> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let settings = config_manager.load_user_config()?;
    let debug_mode = cli.debug || settings.debug_mode;

    // Guard must be kept alive for the duration of the program
    let _log_guard = modsync::logging::setup_logging_with_console(
        &config_manager.config_dir().join("logs"),
        "modsync",
        debug_mode,
        debug_mode,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let mut session = SessionState::from_settings(&settings);
    if let Some(platform) = cli.platform {
        session.active_platform = platform;
    }
    // Every per-plugin removal reports on its own, so the event buffer grows with them
    let removals = match &cli.command {
        Commands::Remove { names, .. } => names.len(),
        _ => 0,
    };
    let state = StateManager::with_capacity(session, event_capacity_for(removals));
    if let Some(formats) = &cli.formats {
        state.set_formats(formats);
    }

    let shell = Arc::new(SshShell::new(settings.device.clone()));
    let releases = Arc::new(
        GithubReleases::new(settings.releases.clone()).context("Failed to create HTTP client")?,
    );
    let transport = DeviceTransport::new(
        shell.clone(),
        releases,
        settings.catalog.clone(),
        settings.device.lv2_dir.clone(),
    );

    let metrics = Arc::new(SyncMetrics::new());
    let controller = SyncController::new(state, Arc::new(transport))
        .with_config(config_manager)
        .with_metrics(Arc::clone(&metrics));
    let mut rx = controller.state().subscribe();

    let succeeded = match cli.command {
        Commands::List { mode } => handle_list(&controller, mode).await,
        Commands::Install { names } => handle_bulk(&controller, Mode::Install, &names).await,
        Commands::Uninstall { names } => handle_bulk(&controller, Mode::Uninstall, &names).await,
        Commands::Upload { bundles } => controller.upload_folders(&bundles).await,
        Commands::Remove { format, names } => controller.remove_many(format, &names).await,
        Commands::Folders { vst3, clap } => handle_folders(&controller, vst3, clap).await,
    };

    print_notifications(&mut rx);

    let disconnected = controller.state().read(|state| state.mod_disconnected);
    if disconnected {
        eprintln!(
            "MOD device is not connected ({}). Check the USB connection and run the command again to reconnect.",
            settings.device.host
        );
    }

    if let Err(e) = shell.disconnect().await {
        tracing::debug!("Closing SSH session failed: {}", e);
    }

    metrics.log_summary();
    tracing::info!("Shutdown complete");

    Ok(succeeded && !disconnected)
}

async fn handle_list(controller: &SyncController, mode: Mode) -> bool {
    if !controller.set_mode(mode).await {
        return false;
    }

    let state = controller.state().snapshot();
    for format in PluginFormat::ALL {
        if !state.wants(format) {
            continue;
        }

        let heading = match format {
            PluginFormat::ModAudio => format!("{} ({})", format, state.active_platform),
            _ => format.to_string(),
        };

        match state.inventory.visible(format, state.active_platform) {
            Some(plugins) if plugins.is_empty() => println!("{}: none", heading),
            Some(plugins) => {
                println!("{}:", heading);
                for name in plugins {
                    println!("  {}", name);
                }
            }
            None => println!("{}: disconnected", heading),
        }
    }
    true
}

/// Fetch for `mode`, narrow the selection to `names` if given, then run it
async fn handle_bulk(controller: &SyncController, mode: Mode, names: &[String]) -> bool {
    if !controller.set_mode(mode).await {
        return false;
    }

    let state = controller.state();
    if !names.is_empty() {
        let formats = state.read(|state| state.formats.clone());
        for format in formats {
            state.set_selected(format, names);
        }
    }

    match mode {
        Mode::Install => controller.install_selection().await,
        Mode::Uninstall => controller.uninstall_selection().await,
    }
}

async fn handle_folders(
    controller: &SyncController,
    vst3: Option<camino::Utf8PathBuf>,
    clap: Option<camino::Utf8PathBuf>,
) -> bool {
    let mut succeeded = true;
    for (format, folder) in [(PluginFormat::Vst3, vst3), (PluginFormat::Clap, clap)] {
        if let Some(folder) = folder {
            // Empty path clears the override
            let folder = (!folder.as_str().is_empty()).then_some(folder);
            succeeded &= controller.set_folder(format, folder).await;
        }
    }

    let folders = controller.state().read(|state| state.folders.clone());
    for format in [PluginFormat::Vst3, PluginFormat::Clap] {
        match folders.get(format) {
            Some(folder) => println!("{}: {}", format, folder),
            None => match default_plugin_folder(format) {
                Some(folder) => println!("{}: {} (default)", format, folder),
                None => println!("{}: no default on this system", format),
            },
        }
    }
    succeeded
}

fn print_notifications(rx: &mut broadcast::Receiver<StateChange>) {
    loop {
        match rx.try_recv() {
            Ok(StateChange::Notification { level, message }) => match level {
                NotificationLevel::Success => println!("{}", message),
                NotificationLevel::Error => eprintln!("Error: {}", message),
            },
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} state changes", skipped);
                eprintln!("Error: {} messages were dropped, see the log file for details", skipped);
            }
            Err(_) => break,
        }
    }
}
