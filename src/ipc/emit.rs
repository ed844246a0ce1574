use tauri::{AppHandle, Emitter};
use tokio::sync::watch;
use tracing::debug;

use crate::events::{event_names, ErrorEvent, StateChangedEvent};
use crate::session::SessionSnapshot;
use crate::state::{CaptureError, SessionStatus};

pub(crate) fn emit_state_change(
    app: &AppHandle,
    previous: SessionStatus,
    current: &SessionSnapshot,
) {
    let _ = app.emit(
        event_names::STATE_CHANGED,
        StateChangedEvent {
            state: current.status,
            previous,
            capturing: current.capturing,
            screen: current.screen.clone(),
            audio: current.audio.clone(),
        },
    );
}

pub(crate) fn emit_error(app: &AppHandle, error: &CaptureError) {
    let _ = app.emit(
        event_names::ERROR,
        ErrorEvent {
            error: error.clone(),
        },
    );
}

/// Mirror every published session snapshot to the webview
pub(crate) fn forward_session_changes(
    app: AppHandle,
    mut updates: watch::Receiver<SessionSnapshot>,
) {
    tauri::async_runtime::spawn(async move {
        let mut previous = updates.borrow_and_update().status;
        while updates.changed().await.is_ok() {
            let current = updates.borrow_and_update().clone();
            if current.status != previous {
                debug!("Session {:?} -> {:?}", previous, current.status);
            }
            emit_state_change(&app, previous, &current);
            previous = current.status;
        }
    });
}
