use super::{CaptureSessionManager, SessionSnapshot};
use crate::capture::{CaptureBackend, CaptureBackendError, MediaStreamHandle};
use crate::preview::DisplaySink;
use crate::state::CaptureError;

/// An in-flight `start`. Exactly one of `commit`, `fail` or drop settles it;
/// a drop means the start future was abandoned and the session goes back to
/// `Idle`.
pub(super) struct StartAttempt<'a, B: CaptureBackend, S: DisplaySink> {
    manager: &'a CaptureSessionManager<B, S>,
    settled: bool,
}

impl<'a, B: CaptureBackend, S: DisplaySink> StartAttempt<'a, B, S> {
    pub(super) fn new(manager: &'a CaptureSessionManager<B, S>) -> Self {
        Self {
            manager,
            settled: false,
        }
    }

    /// Both streams are live; hand them to the session
    pub(super) fn commit(
        mut self,
        screen: MediaStreamHandle,
        audio: MediaStreamHandle,
    ) -> SessionSnapshot {
        self.settled = true;
        self.manager.settle_success(screen, audio)
    }

    /// Release whatever was acquired and report the classified error
    pub(super) fn fail(
        mut self,
        err: &CaptureBackendError,
        acquired: Option<MediaStreamHandle>,
    ) -> CaptureError {
        self.settled = true;
        let error = CaptureError::from(err);
        self.manager.settle_failure(acquired, error.clone());
        error
    }
}

impl<B: CaptureBackend, S: DisplaySink> Drop for StartAttempt<'_, B, S> {
    fn drop(&mut self) {
        if !self.settled {
            self.manager.abandon();
        }
    }
}
