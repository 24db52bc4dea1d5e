//! iclippy-hotkey: Global hotkey daemon for the iClippy clipboard history app
//!
//! This daemon runs alongside the menu bar app and provides:
//! - Registration of the system-wide "show history" hotkey
//! - Persistence of the configured binding across restarts
//! - IPC server the menu bar app uses to receive hotkey events and to
//!   read, change or reset the binding
//!
//! The clipboard history itself lives in the menu bar app; this daemon
//! only forwards clear requests to it.

mod config;
mod events;
mod history;
mod hotkey;
mod ipc;
mod lifecycle;
mod settings;

use std::sync::{mpsc, Arc};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::AppEvent;
use crate::history::RemoteHistory;
use crate::hotkey::{DisabledBackend, GlobalHotkeyBackend, HotKeyRegistrar, HotkeyBackend};
use crate::ipc::Server;
use crate::lifecycle::{Command, ControlLoop, ShutdownSignal};
use crate::settings::{KeyBindingStore, Preferences, SettingsController};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "iclippy-hotkey starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.preferences_path, "configuration loaded");

    // IPC and signal handling run on a background runtime; the main thread
    // owns the hotkey registration.
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;

    // Hotkey + settings -> IPC clients
    let (event_tx, _) = broadcast::channel::<AppEvent>(64);
    // IPC server + signal handler -> main thread
    let (command_tx, command_rx) = mpsc::channel::<Command>();

    let backend: Box<dyn HotkeyBackend> = match GlobalHotkeyBackend::new() {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            error!(?e, "failed to open OS hotkey facility");
            Box::new(DisabledBackend::new(e.to_string()))
        }
    };

    let store = KeyBindingStore::new(Preferences::new(&config.preferences_path));
    let registrar = HotKeyRegistrar::new(backend, event_tx.clone());
    let history = Arc::new(RemoteHistory::new(event_tx.clone()));
    let mut controller = SettingsController::new(store, registrar, history, event_tx.clone());

    match controller.activate() {
        Ok(()) => {
            info!(shortcut = %controller.current_description(), "show-history hotkey active");
        }
        Err(e) => {
            error!(?e, "failed to register show-history hotkey");
            warn!("continuing without hotkey - pick another shortcut in Settings");
        }
    }

    let server = {
        let _guard = runtime.enter();
        Arc::new(Server::new(&config.socket_path, command_tx.clone(), event_tx.clone())?)
    };

    // Run the IPC server (accepts client connections)
    let ipc_server = Arc::clone(&server);
    runtime.spawn(async move {
        if let Err(e) = ipc_server.run().await {
            error!(?e, "IPC server error");
        }
    });

    // Log application events
    let mut log_rx = event_tx.subscribe();
    runtime.spawn(async move {
        loop {
            match log_rx.recv().await {
                Ok(event) => info!(%event, "application event"),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Wait for shutdown signal
    runtime.spawn(async move {
        if let Err(e) = ShutdownSignal::new().wait().await {
            error!(?e, "signal handling failed");
            return;
        }
        info!("shutdown signal received");
        let _ = command_tx.send(Command::Shutdown);
    });

    info!("daemon initialized, entering main loop");

    // Returns after shutdown with the hotkey released
    ControlLoop::new(controller, command_rx).run();

    // Cleanup
    info!("shutting down...");
    runtime.block_on(server.shutdown());

    info!("iclippy-hotkey stopped");

    Ok(())
}
