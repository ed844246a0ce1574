// Capture backend abstraction
//
// This module defines the contract for capture backends and provides
// OS-specific implementations.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(test)]
pub mod fake;

use crate::broker::{
    AuthorizationDecision, BrokerError, DisplayMediaRequest, HandlerRegistry, SourceDescriptor,
};
use crate::config::AudioConstraints;
use crate::preview::{FrameReceiver, PreviewSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
}

/// What a stream handle was acquired for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Screen,
    Microphone,
}

/// A single hardware-backed track
pub trait MediaTrack: Send {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    fn is_live(&self) -> bool;

    /// Stop the track and free the device behind it. Stopping twice is a no-op.
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub kind: TrackKind,
    pub label: String,
    pub live: bool,
}

/// Serializable description of a stream handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub id: Uuid,
    pub kind: StreamKind,
    pub source: Option<SourceDescriptor>,
    pub tracks: Vec<TrackInfo>,
}

/// Owned reference to a live media source.
///
/// Releasing (or dropping) the handle stops every track it holds.
pub struct MediaStreamHandle {
    id: Uuid,
    kind: StreamKind,
    source: Option<SourceDescriptor>,
    tracks: Vec<Box<dyn MediaTrack>>,
    frames: Option<FrameReceiver>,
}

impl MediaStreamHandle {
    pub fn new(kind: StreamKind, tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: None,
            tracks,
            frames: None,
        }
    }

    pub fn with_source(mut self, source: SourceDescriptor) -> Self {
        self.source = Some(source);
        self
    }

    /// Attach the latest-frame feed used for previews
    pub fn with_frames(mut self, frames: FrameReceiver) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn source(&self) -> Option<&SourceDescriptor> {
        self.source.as_ref()
    }

    pub fn is_live(&self) -> bool {
        !self.tracks.is_empty() && self.tracks.iter().any(|track| track.is_live())
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id,
            kind: self.kind,
            source: self.source.clone(),
            tracks: self
                .tracks
                .iter()
                .map(|track| TrackInfo {
                    kind: track.kind(),
                    label: track.label().to_string(),
                    live: track.is_live(),
                })
                .collect(),
        }
    }

    /// Non-owning view for a display sink
    pub fn preview(&self) -> PreviewSource {
        PreviewSource {
            stream: self.info(),
            frames: self.frames.clone(),
        }
    }

    /// Stop all tracks and invalidate the handle
    pub fn release(mut self) {
        debug!("Releasing {:?} stream {}", self.kind, self.id);
        self.stop_tracks();
    }

    fn stop_tracks(&mut self) {
        for mut track in self.tracks.drain(..) {
            if track.is_live() {
                track.stop();
            }
        }
        self.frames = None;
    }
}

impl Drop for MediaStreamHandle {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

impl fmt::Debug for MediaStreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

/// Errors that can occur while acquiring a stream
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureBackendError {
    /// User or OS declined a capture prompt
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Portal communication error
    #[error("Portal error: {0}")]
    PortalError(String),
    /// No suitable capture source or device available
    #[error("No source available: {0}")]
    NoSourceAvailable(String),
    #[error("Device busy: {0}")]
    DeviceBusy(String),
    /// Screen capture attempted before the display media handler was installed
    #[error("No display media handler is installed")]
    HandlerMissing,
    /// Backend not available on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Trait for capture backends
///
/// Each OS implements this trait to open the screen and microphone streams a
/// capture session is made of. The two calls are independent; the session
/// manager decides how they are sequenced.
pub trait CaptureBackend: Send + Sync {
    /// Acquire a screen video stream, without audio.
    ///
    /// The platform shows its native picker; the offered sources are passed
    /// through the installed display media handler before a track is opened.
    fn acquire_screen(
        &self,
        request: &DisplayMediaRequest,
    ) -> impl Future<Output = Result<MediaStreamHandle, CaptureBackendError>> + Send;

    /// Acquire a microphone audio stream, without video.
    fn acquire_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> impl Future<Output = Result<MediaStreamHandle, CaptureBackendError>> + Send;
}

/// Ask the installed handler which of the offered sources may be captured
pub(crate) fn resolve_source(
    handlers: &HandlerRegistry,
    request: &DisplayMediaRequest,
    candidates: &[SourceDescriptor],
) -> Result<SourceDescriptor, CaptureBackendError> {
    match handlers.authorize(request, candidates) {
        Ok(AuthorizationDecision::Grant { video }) => Ok(video),
        Ok(AuthorizationDecision::Deny { reason }) => {
            Err(CaptureBackendError::PermissionDenied(reason))
        }
        Err(BrokerError::NotInstalled) => Err(CaptureBackendError::HandlerMissing),
        Err(err) => Err(CaptureBackendError::Internal(err.to_string())),
    }
}

#[cfg(target_os = "linux")]
pub type PlatformBackend = linux::LinuxCaptureBackend;

#[cfg(not(target_os = "linux"))]
pub type PlatformBackend = StubBackend;

/// Get the appropriate capture backend for the current platform
#[cfg(target_os = "linux")]
pub fn get_backend(preview: &crate::config::PreviewConfig) -> PlatformBackend {
    linux::LinuxCaptureBackend::new(preview.clone())
}

#[cfg(not(target_os = "linux"))]
pub fn get_backend(_preview: &crate::config::PreviewConfig) -> PlatformBackend {
    StubBackend
}

/// Stub backend for unsupported platforms
#[cfg(not(target_os = "linux"))]
#[derive(Debug, Default)]
pub struct StubBackend;

#[cfg(not(target_os = "linux"))]
impl CaptureBackend for StubBackend {
    async fn acquire_screen(
        &self,
        _request: &DisplayMediaRequest,
    ) -> Result<MediaStreamHandle, CaptureBackendError> {
        Err(CaptureBackendError::NotSupported(
            "Screen capture not implemented for this platform".to_string(),
        ))
    }

    async fn acquire_microphone(
        &self,
        _constraints: &AudioConstraints,
    ) -> Result<MediaStreamHandle, CaptureBackendError> {
        Err(CaptureBackendError::NotSupported(
            "Microphone capture not implemented for this platform".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{DisplayAuthorizationBroker, SourceKind};
    use crate::config::CaptureConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FlagTrack {
        live: Arc<AtomicBool>,
        stops: u32,
    }

    impl MediaTrack for FlagTrack {
        fn kind(&self) -> TrackKind {
            TrackKind::Video
        }

        fn label(&self) -> &str {
            "flag"
        }

        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }

        fn stop(&mut self) {
            self.stops += 1;
            assert_eq!(self.stops, 1, "track stopped twice");
            self.live.store(false, Ordering::SeqCst);
        }
    }

    fn flag_handle(flags: &[Arc<AtomicBool>]) -> MediaStreamHandle {
        let tracks = flags
            .iter()
            .map(|live| {
                live.store(true, Ordering::SeqCst);
                Box::new(FlagTrack {
                    live: Arc::clone(live),
                    stops: 0,
                }) as Box<dyn MediaTrack>
            })
            .collect();
        MediaStreamHandle::new(StreamKind::Screen, tracks)
    }

    #[test]
    fn test_release_stops_every_track() {
        let flags = [Arc::new(AtomicBool::new(false)), Arc::new(AtomicBool::new(false))];
        let handle = flag_handle(&flags);
        assert!(handle.is_live());
        assert_eq!(handle.info().tracks.len(), 2);

        handle.release();
        assert!(flags.iter().all(|live| !live.load(Ordering::SeqCst)));
    }

    #[test]
    fn test_drop_stops_tracks() {
        let flag = Arc::new(AtomicBool::new(false));
        {
            let _handle = flag_handle(std::slice::from_ref(&flag));
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_handle_without_tracks_is_not_live() {
        let handle = MediaStreamHandle::new(StreamKind::Microphone, Vec::new());
        assert!(!handle.is_live());
    }

    #[test]
    fn test_preview_has_no_frames_unless_attached() {
        let flag = Arc::new(AtomicBool::new(false));
        let handle = flag_handle(std::slice::from_ref(&flag));
        let preview = handle.preview();
        assert_eq!(preview.stream.id, handle.id());
        assert!(preview.frames.is_none());
    }

    #[test]
    fn test_resolve_source_maps_decisions() {
        let request = DisplayMediaRequest::from_config(&CaptureConfig::default());
        let candidate = SourceDescriptor {
            id: "41".to_string(),
            name: "Monitor".to_string(),
            kind: SourceKind::Screen,
            width: None,
            height: None,
        };

        let handlers = HandlerRegistry::new();
        assert_eq!(
            resolve_source(&handlers, &request, std::slice::from_ref(&candidate)),
            Err(CaptureBackendError::HandlerMissing)
        );

        handlers
            .install(Arc::new(DisplayAuthorizationBroker))
            .unwrap();
        assert_eq!(
            resolve_source(&handlers, &request, std::slice::from_ref(&candidate)),
            Ok(candidate)
        );
        assert!(matches!(
            resolve_source(&handlers, &request, &[]),
            Err(CaptureBackendError::PermissionDenied(_))
        ));
    }
}
