use crate::capture::{MediaTrack, TrackKind};
use ashpd::desktop::screencast::Screencast;
use ashpd::desktop::Session;
use gstreamer::prelude::*;
use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd};
use tracing::{debug, warn};

pub(super) type PortalSession = Session<'static, Screencast<'static>>;

/// Close a portal session without waiting for the reply
pub(super) fn close_session(session: PortalSession) {
    tauri::async_runtime::spawn(async move {
        if let Err(e) = session.close().await {
            warn!("Failed to close portal session: {}", e);
        }
    });
}

/// A started portal stream. The fd keeps the PipeWire node alive.
pub(super) struct PortalStream {
    pub session: PortalSession,
    pub fd: OwnedFd,
    pub node_id: u32,
}

impl fmt::Debug for PortalStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalStream")
            .field("node_id", &self.node_id)
            .field("pipewire_fd", &self.fd.as_raw_fd())
            .finish()
    }
}

/// Video track fed by a portal stream
pub(super) struct ScreenTrack {
    label: String,
    pipeline: Option<gstreamer::Pipeline>,
    portal: Option<PortalStream>,
}

impl ScreenTrack {
    pub fn new(label: String, portal: PortalStream) -> Self {
        Self {
            label,
            pipeline: None,
            portal: Some(portal),
        }
    }

    pub fn attach(&mut self, pipeline: gstreamer::Pipeline) {
        self.pipeline = Some(pipeline);
    }
}

impl MediaTrack for ScreenTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        self.portal.is_some()
    }

    fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
        if let Some(PortalStream {
            session,
            fd,
            node_id,
        }) = self.portal.take()
        {
            debug!("Closing portal stream for node {}", node_id);
            drop(fd);
            close_session(session);
        }
    }
}

impl Drop for ScreenTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Audio track backed by a running capture pipeline
pub(super) struct MicrophoneTrack {
    label: String,
    pipeline: Option<gstreamer::Pipeline>,
}

impl MicrophoneTrack {
    pub fn new(label: String, pipeline: gstreamer::Pipeline) -> Self {
        Self {
            label,
            pipeline: Some(pipeline),
        }
    }
}

impl MediaTrack for MicrophoneTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Audio
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        self.pipeline.is_some()
    }

    fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            debug!("Stopping microphone pipeline ({})", self.label);
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
    }
}

impl Drop for MicrophoneTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
