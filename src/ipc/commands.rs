use tauri::AppHandle;
use tracing::info;

use crate::config::CaptureConfig;
use crate::ipc::emit::emit_error;
use crate::session::SessionSnapshot;
use crate::AppState;

#[tauri::command]
pub(crate) fn get_session(state: tauri::State<AppState>) -> SessionSnapshot {
    state.manager.snapshot()
}

/// Start sharing the screen and microphone. Without a config the defaults
/// are used.
#[tauri::command]
pub(crate) async fn start_capture(
    app: AppHandle,
    state: tauri::State<'_, AppState>,
    config: Option<CaptureConfig>,
) -> Result<SessionSnapshot, String> {
    let config = config.unwrap_or_default();
    info!("Start capture requested");

    state.manager.start(&config).await.map_err(|error| {
        emit_error(&app, &error);
        error.message
    })
}

#[tauri::command]
pub(crate) fn stop_capture(state: tauri::State<AppState>) -> SessionSnapshot {
    info!("Stop capture requested");
    state.manager.stop()
}
