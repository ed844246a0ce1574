pub mod broker;
pub mod capture;
pub mod config;
pub mod events;
mod ipc;
pub mod preview;
pub mod session;
pub mod state;

use std::sync::Arc;
use tauri::{Manager, RunEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use broker::DisplayAuthorizationBroker;
use capture::PlatformBackend;
use config::PreviewConfig;
use preview::TauriPreviewSink;
use session::CaptureSessionManager;

/// Application state managed by Tauri
pub struct AppState {
    pub manager: CaptureSessionManager<PlatformBackend, TauriPreviewSink>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    init_logging();

    // Must be in place before any screen capture is requested
    if let Err(e) = broker::install_display_media_handler(Arc::new(DisplayAuthorizationBroker)) {
        warn!("{}", e);
    }

    let preview = PreviewConfig::load(std::env::var(config::PREVIEW_ENV).ok().as_deref());
    info!("Preview: {}px wide, up to {} fps", preview.width, preview.max_fps);

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(move |app| {
            let sink = TauriPreviewSink::new(app.handle().clone(), preview.clone());
            let manager = CaptureSessionManager::new(capture::get_backend(&preview), sink);
            ipc::emit::forward_session_changes(app.handle().clone(), manager.subscribe());
            app.manage(AppState { manager });

            #[cfg(debug_assertions)]
            {
                if let Some(window) = app.get_webview_window("main") {
                    window.open_devtools();
                }
            }

            info!("Live capture ready");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            ipc::commands::get_session,
            ipc::commands::start_capture,
            ipc::commands::stop_capture,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            // Leave no device open behind the process
            if let Some(state) = handle.try_state::<AppState>() {
                state.manager.stop();
            }
        }
    });
}
