use super::*;
use crate::broker::{DisplayMediaRequest, SourceDescriptor, SourceKind};
use crate::capture::{CaptureBackend, CaptureBackendError, StreamKind};
use crate::config::{AudioConstraints, CaptureConfig};

pub(super) fn test_request() -> DisplayMediaRequest {
    DisplayMediaRequest::from_config(&CaptureConfig::default())
}

pub(super) fn window(id: &str) -> SourceDescriptor {
    SourceDescriptor {
        id: id.to_string(),
        name: format!("Window {}", id),
        kind: SourceKind::Window,
        width: Some(800),
        height: Some(600),
    }
}

mod microphone;
