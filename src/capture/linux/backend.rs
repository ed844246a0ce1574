use crate::broker::{self, DisplayMediaRequest, SourceDescriptor, SourceKind};
use crate::capture::{
    resolve_source, CaptureBackend, CaptureBackendError, MediaStreamHandle, StreamKind,
};
use crate::config::{AudioConstraints, PreviewConfig};
use ashpd::desktop::screencast::{CursorMode, Screencast, Streams};
use ashpd::desktop::{PersistMode, ResponseError};
use std::os::fd::AsRawFd;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use super::elements::{
    detect_microphone_source, microphone_description, preview_description, source_kind,
    source_types, PREVIEW_SINK,
};
use super::pipeline;
use super::tracks::{close_session, MicrophoneTrack, PortalSession, PortalStream, ScreenTrack};

pub struct LinuxCaptureBackend {
    pub(super) preview: PreviewConfig,
    /// Screencast proxy, connected on first use and kept for the process
    /// lifetime (leaked for 'static, portal sessions borrow from it)
    pub(super) screencast: OnceCell<&'static Screencast<'static>>,
}

impl LinuxCaptureBackend {
    pub fn new(preview: PreviewConfig) -> Self {
        Self {
            preview,
            screencast: OnceCell::new(),
        }
    }

    async fn screencast(&self) -> Result<&'static Screencast<'static>, CaptureBackendError> {
        self.screencast
            .get_or_try_init(|| async {
                let screencast = Screencast::new().await.map_err(|e| {
                    CaptureBackendError::PortalError(format!(
                        "Failed to connect to screencast portal: {}",
                        e
                    ))
                })?;
                debug!("Connected to screencast portal");
                Ok::<_, CaptureBackendError>(&*Box::leak(Box::new(screencast)))
            })
            .await
            .copied()
    }

    /// Select and start a portal stream, then let the broker pick from what
    /// the user shared
    async fn negotiate(
        screencast: &'static Screencast<'static>,
        session: &PortalSession,
        request: &DisplayMediaRequest,
    ) -> Result<(SourceDescriptor, u32), CaptureBackendError> {
        let cursor_mode = if request.include_cursor {
            CursorMode::Embedded
        } else {
            CursorMode::Hidden
        };

        // Shows the portal picker dialog
        screencast
            .select_sources(
                session,
                cursor_mode,
                source_types(&request.sources),
                false, // multiple sources
                None,  // restore token
                PersistMode::DoNot,
            )
            .await
            .map_err(|e| portal_error("Failed to select sources", e))?;

        debug!("Source selection completed");

        let streams = screencast
            .start(session, None)
            .await
            .map_err(|e| portal_error("Failed to start screencast", e))?
            .response()
            .map_err(|e| portal_error("Failed to get screencast response", e))?;

        let candidates = candidates(&streams);
        let source = resolve_source(broker::registry(), request, &candidates)?;
        let node_id = source.id.parse::<u32>().map_err(|_| {
            CaptureBackendError::Internal(format!("Granted source {} is not a node", source.id))
        })?;

        Ok((source, node_id))
    }

    async fn open_screen(
        &self,
        request: &DisplayMediaRequest,
    ) -> Result<MediaStreamHandle, CaptureBackendError> {
        let screencast = self.screencast().await?;

        let session = screencast
            .create_session()
            .await
            .map_err(|e| portal_error("Failed to create session", e))?;
        debug!("Portal session created");

        let negotiated = Self::negotiate(screencast, &session, request).await;
        let (source, node_id) = match negotiated {
            Ok(granted) => granted,
            Err(e) => {
                close_session(session);
                return Err(e);
            }
        };

        // The fd is what GStreamer connects through
        let fd = match screencast.open_pipe_wire_remote(&session).await {
            Ok(fd) => fd,
            Err(e) => {
                close_session(session);
                return Err(portal_error("Failed to open PipeWire remote", e));
            }
        };

        info!(
            "Got PipeWire node ID: {}, fd: {} ({})",
            node_id,
            fd.as_raw_fd(),
            source.name
        );

        let fps = request.frame_rate.effective();
        let description = preview_description(fd.as_raw_fd(), node_id, fps, self.preview.width);

        // From here on, dropping the track closes the portal stream
        let mut track = ScreenTrack::new(
            source.name.clone(),
            PortalStream {
                session,
                fd,
                node_id,
            },
        );

        pipeline::init()?;
        let preview = pipeline::build(&description)?;
        let frames = pipeline::attach_frames(&preview, PREVIEW_SINK)?;
        track.attach(preview.clone());

        tokio::task::spawn_blocking(move || pipeline::start(&preview))
            .await
            .map_err(|e| CaptureBackendError::Internal(format!("Preview task failed: {}", e)))??;

        info!("Screen preview running at {} fps", fps);

        Ok(
            MediaStreamHandle::new(StreamKind::Screen, vec![Box::new(track)])
                .with_source(source)
                .with_frames(frames),
        )
    }
}

impl std::fmt::Debug for LinuxCaptureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxCaptureBackend")
            .field("preview", &self.preview)
            .field("connected", &self.screencast.initialized())
            .finish()
    }
}

impl Default for LinuxCaptureBackend {
    fn default() -> Self {
        Self::new(PreviewConfig::default())
    }
}

impl CaptureBackend for LinuxCaptureBackend {
    async fn acquire_screen(
        &self,
        request: &DisplayMediaRequest,
    ) -> Result<MediaStreamHandle, CaptureBackendError> {
        info!("Requesting screen via portal (request {})", request.id);

        self.open_screen(request).await.map_err(|e| {
            error!("Screen acquisition failed: {}", e);
            e
        })
    }

    async fn acquire_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<MediaStreamHandle, CaptureBackendError> {
        pipeline::init()?;

        let source = detect_microphone_source().ok_or_else(|| {
            CaptureBackendError::NoSourceAvailable(
                "No audio capture element available".to_string(),
            )
        })?;
        let device = constraints.device.as_deref();
        info!("Requesting microphone via {} ({:?})", source, device);

        let capture = pipeline::build(&microphone_description(source, device))?;
        let label = device.unwrap_or("Default Microphone").to_string();

        // Dropping the track stops the pipeline if this future is abandoned
        let track = MicrophoneTrack::new(label.clone(), capture.clone());
        tokio::task::spawn_blocking(move || pipeline::start(&capture))
            .await
            .map_err(|e| {
                CaptureBackendError::Internal(format!("Microphone task failed: {}", e))
            })??;

        info!("Microphone running ({})", label);

        Ok(MediaStreamHandle::new(
            StreamKind::Microphone,
            vec![Box::new(track)],
        ))
    }
}

/// Offer every stream the portal started as a candidate, keyed by node id
pub(super) fn candidates(streams: &Streams) -> Vec<SourceDescriptor> {
    streams
        .streams()
        .iter()
        .map(|stream| {
            let kind = source_kind(stream.source_type());
            let node_id = stream.pipe_wire_node_id();
            let (width, height) = stream
                .size()
                .map(|(w, h)| (u32::try_from(w).ok(), u32::try_from(h).ok()))
                .unwrap_or((None, None));

            SourceDescriptor {
                id: node_id.to_string(),
                name: match kind {
                    SourceKind::Screen => format!("Screen {}", node_id),
                    SourceKind::Window => format!("Window {}", node_id),
                },
                kind,
                width,
                height,
            }
        })
        .collect()
}

/// A cancelled portal dialog is the user declining
pub(super) fn portal_error(context: &str, err: ashpd::Error) -> CaptureBackendError {
    match err {
        ashpd::Error::Response(ResponseError::Cancelled) => {
            CaptureBackendError::PermissionDenied("User cancelled screen selection".to_string())
        }
        other => CaptureBackendError::PortalError(format!("{}: {}", context, other)),
    }
}
