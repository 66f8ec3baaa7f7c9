//! Desktop shell built on Tauri
//!
//! Wires the harvest manager to real webview windows and exposes it to
//! the main window over IPC.

mod commands;
mod host;

use std::sync::Arc;

use tauri::{Manager, RunEvent};
use tracing_subscriber::EnvFilter;

use crate::bridge::PageBridge;
use crate::config::AppConfig;
use crate::harvest::{CredentialHarvester, HarvestManager};

pub use host::{TauriHost, HARVEST_LABEL_PREFIX};

/// State shared with IPC commands
pub struct AppState {
    pub manager: Arc<HarvestManager>,
    pub bridge: Arc<PageBridge>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sharelatex_shell_lib=debug,info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initializes and runs the Tauri application
pub fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    if AppConfig::config_path().is_some_and(|path| !path.exists()) {
        match config.save() {
            Ok(()) => tracing::info!("Wrote default config"),
            Err(e) => tracing::warn!("Could not write default config: {}", e),
        }
    }
    tracing::info!("Starting ShareLaTeX shell...");
    tracing::debug!("Config: {:?}", config);

    let app = tauri::Builder::default()
        .setup(move |app| {
            let bridge = Arc::new(PageBridge::new());
            let host = Arc::new(TauriHost::new(
                app.handle().clone(),
                Arc::clone(&bridge),
                config.eval_timeout(),
            ));
            let harvester = CredentialHarvester::new(host, config.harvest_settings());

            app.manage(AppState {
                manager: Arc::new(HarvestManager::new(harvester)),
                bridge,
            });

            tracing::info!("ShareLaTeX shell initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::open_new_window,
            commands::shell_request,
            commands::report_page_value,
            commands::harvest_status,
            commands::cancel_harvest,
        ])
        .build(tauri::generate_context!())?;

    app.run(|app, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = app.try_state::<AppState>() {
                let manager = Arc::clone(&state.manager);
                tauri::async_runtime::block_on(manager.cancel_all());
            }
        }
    });

    Ok(())
}
