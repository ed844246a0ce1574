use crate::capture::CaptureBackendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capture session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session; no handles held
    #[default]
    Idle,
    /// Screen and microphone are being acquired
    Requesting,
    /// Both streams are live
    Active,
    /// Handles are being released
    Stopping,
    /// An acquisition failed and the session is rolling back
    Failed,
}

/// Error codes reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The user or the OS declined a capture prompt
    PermissionDenied,
    /// No compatible device, device busy, or platform failure
    DeviceError,
    /// `start` called while a session is requesting or active
    AlreadyActive,
    InvalidConfig,
}

/// Error details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct CaptureError {
    pub code: ErrorCode,
    pub message: String,
}

impl CaptureError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn already_active(status: SessionStatus) -> Self {
        Self::new(
            ErrorCode::AlreadyActive,
            format!("A capture session is already {:?}", status).to_lowercase(),
        )
    }
}

impl From<&CaptureBackendError> for CaptureError {
    fn from(err: &CaptureBackendError) -> Self {
        let code = match err {
            CaptureBackendError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            CaptureBackendError::PortalError(_)
            | CaptureBackendError::NoSourceAvailable(_)
            | CaptureBackendError::DeviceBusy(_)
            | CaptureBackendError::HandlerMissing
            | CaptureBackendError::NotSupported(_)
            | CaptureBackendError::Internal(_) => ErrorCode::DeviceError,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// State transition error
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Transition table for a capture session
#[derive(Debug, Default)]
pub struct StateMachine {
    status: SessionStatus,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Validate and perform state transition
    fn transition(&mut self, to: SessionStatus) -> Result<SessionStatus, TransitionError> {
        let from = self.status;

        let valid = match (from, to) {
            (SessionStatus::Idle, SessionStatus::Requesting) => true,

            (SessionStatus::Requesting, SessionStatus::Active) => true,
            (SessionStatus::Requesting, SessionStatus::Failed) => true,
            // start() future dropped before it settled
            (SessionStatus::Requesting, SessionStatus::Idle) => true,

            (SessionStatus::Failed, SessionStatus::Idle) => true,

            (SessionStatus::Active, SessionStatus::Stopping) => true,
            (SessionStatus::Stopping, SessionStatus::Idle) => true,

            (a, b) if a == b => true,

            _ => false,
        };

        if valid {
            self.status = to;
            Ok(to)
        } else {
            Err(TransitionError { from, to })
        }
    }

    /// Idle → Requesting
    pub fn begin_request(&mut self) -> Result<SessionStatus, TransitionError> {
        self.transition(SessionStatus::Requesting)
    }

    /// Requesting → Active
    pub fn activate(&mut self) -> Result<SessionStatus, TransitionError> {
        self.transition(SessionStatus::Active)
    }

    /// Requesting → Failed
    pub fn fail(&mut self) -> Result<SessionStatus, TransitionError> {
        self.transition(SessionStatus::Failed)
    }

    /// Active → Stopping
    pub fn begin_stop(&mut self) -> Result<SessionStatus, TransitionError> {
        self.transition(SessionStatus::Stopping)
    }

    /// Stopping/Failed/Requesting → Idle
    pub fn settle(&mut self) -> Result<SessionStatus, TransitionError> {
        self.transition(SessionStatus::Idle)
    }
}
