// Display authorization broker
//
// Resolves display-capture authorization requests raised by a capture
// backend. The native picker (xdg-desktop-portal on Linux) has already asked
// the user; the broker only turns the sources the platform offers into a
// grant or a denial.

use crate::config::{CaptureConfig, FrameRateRange, SourceFilter};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Kind of display source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Screen,
    Window,
}

/// A screen or window the platform is willing to capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Platform identifier (PipeWire node ID on Linux)
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A display-capture request as seen by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMediaRequest {
    pub id: Uuid,
    pub frame_rate: FrameRateRange,
    pub include_cursor: bool,
    pub sources: SourceFilter,
}

impl DisplayMediaRequest {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            frame_rate: config.video.frame_rate,
            include_cursor: config.video.include_cursor,
            sources: config.video.sources,
        }
    }

    fn allows(&self, kind: SourceKind) -> bool {
        match kind {
            SourceKind::Screen => self.sources.screens,
            SourceKind::Window => self.sources.windows,
        }
    }
}

/// Outcome of an authorization request.
///
/// A grant never carries an audio component: system and tab audio are not
/// requested alongside the screen.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationDecision {
    Grant { video: SourceDescriptor },
    Deny { reason: String },
}

impl AuthorizationDecision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }
}

/// Something that can answer display-capture authorization requests.
///
/// Implementations must return without waiting on further user input.
pub trait DisplayMediaHandler: Send + Sync {
    fn handle_request(
        &self,
        request: &DisplayMediaRequest,
        candidates: &[SourceDescriptor],
    ) -> AuthorizationDecision;
}

/// Grants the first offered source the request allows
#[derive(Debug, Default, Clone, Copy)]
pub struct DisplayAuthorizationBroker;

impl DisplayMediaHandler for DisplayAuthorizationBroker {
    fn handle_request(
        &self,
        request: &DisplayMediaRequest,
        candidates: &[SourceDescriptor],
    ) -> AuthorizationDecision {
        for source in candidates {
            debug!(
                "Candidate source {} ({:?}) {:?}x{:?}: {}",
                source.id, source.kind, source.width, source.height, source.name
            );
        }

        match candidates.iter().find(|source| request.allows(source.kind)) {
            Some(source) => {
                info!(
                    "Authorized display request {} for source {}",
                    request.id, source.id
                );
                AuthorizationDecision::Grant {
                    video: source.clone(),
                }
            }
            None => {
                warn!(
                    "Denying display request {}: {} candidate(s), none allowed",
                    request.id,
                    candidates.len()
                );
                AuthorizationDecision::Deny {
                    reason: if candidates.is_empty() {
                        "No display sources were offered".to_string()
                    } else {
                        "No offered display source matches the request".to_string()
                    },
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("A display media handler is already installed")]
    AlreadyInstalled,
    #[error("No display media handler is installed")]
    NotInstalled,
}

/// Holds the single display media handler for a process
#[derive(Default)]
pub struct HandlerRegistry {
    handler: OnceLock<Arc<dyn DisplayMediaHandler>>,
}

impl HandlerRegistry {
    pub const fn new() -> Self {
        Self {
            handler: OnceLock::new(),
        }
    }

    /// Install the handler. Only the first call succeeds.
    pub fn install(&self, handler: Arc<dyn DisplayMediaHandler>) -> Result<(), BrokerError> {
        self.handler
            .set(handler)
            .map_err(|_| BrokerError::AlreadyInstalled)
    }

    pub fn is_installed(&self) -> bool {
        self.handler.get().is_some()
    }

    pub fn authorize(
        &self,
        request: &DisplayMediaRequest,
        candidates: &[SourceDescriptor],
    ) -> Result<AuthorizationDecision, BrokerError> {
        let handler = self.handler.get().ok_or(BrokerError::NotInstalled)?;
        Ok(handler.handle_request(request, candidates))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("installed", &self.is_installed())
            .finish()
    }
}

static DISPLAY_MEDIA_HANDLERS: HandlerRegistry = HandlerRegistry::new();

/// Process-wide registry consulted by the platform backend
pub fn registry() -> &'static HandlerRegistry {
    &DISPLAY_MEDIA_HANDLERS
}

/// Install the display media handler for this process
pub fn install_display_media_handler(
    handler: Arc<dyn DisplayMediaHandler>,
) -> Result<(), BrokerError> {
    registry().install(handler)?;
    info!("Display media handler installed");
    Ok(())
}
