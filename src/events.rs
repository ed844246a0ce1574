use crate::capture::StreamInfo;
use crate::state::{CaptureError, SessionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event emitted when the capture session changes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub state: SessionStatus,
    pub previous: SessionStatus,
    pub capturing: bool,
    pub screen: Option<StreamInfo>,
    pub audio: Option<StreamInfo>,
}

/// Event emitted on error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: CaptureError,
}

/// Event emitted when the preview binding changes; `stream` is null when unbound
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewBoundEvent {
    pub stream: Option<StreamInfo>,
}

/// Event carrying one preview frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewFrameEvent {
    pub stream_id: Uuid,
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

/// Event names for Tauri event system
pub mod event_names {
    pub const STATE_CHANGED: &str = "capture:state_changed";
    pub const ERROR: &str = "capture:error";
    pub const PREVIEW_BOUND: &str = "capture:preview_bound";
    pub const PREVIEW_FRAME: &str = "capture:preview_frame";
}
