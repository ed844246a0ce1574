// Capture session manager
//
// The only owner of the screen and microphone handles. Every status change
// happens under the session lock and is published to subscribers as a
// `SessionSnapshot`; the UI reads snapshots and never keeps its own flags.

mod attempt;

use crate::broker::DisplayMediaRequest;
use crate::capture::{CaptureBackend, MediaStreamHandle, StreamInfo};
use crate::config::CaptureConfig;
use crate::preview::DisplaySink;
use crate::state::{CaptureError, ErrorCode, SessionStatus, StateMachine, TransitionError};
use attempt::StartAttempt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Read-only view of the capture session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Derived from `status`; true only while both streams are held
    pub capturing: bool,
    pub screen: Option<StreamInfo>,
    pub audio: Option<StreamInfo>,
    /// A stop arrived while the session was still requesting
    pub stop_pending: bool,
    pub last_error: Option<CaptureError>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            status: SessionStatus::Idle,
            capturing: false,
            screen: None,
            audio: None,
            stop_pending: false,
            last_error: None,
        }
    }
}

#[derive(Default)]
struct SessionSlot {
    machine: StateMachine,
    screen: Option<MediaStreamHandle>,
    audio: Option<MediaStreamHandle>,
    stop_pending: bool,
    last_error: Option<CaptureError>,
}

impl SessionSlot {
    fn snapshot(&self) -> SessionSnapshot {
        let status = self.machine.status();
        SessionSnapshot {
            status,
            capturing: status == SessionStatus::Active,
            screen: self.screen.as_ref().map(MediaStreamHandle::info),
            audio: self.audio.as_ref().map(MediaStreamHandle::info),
            stop_pending: self.stop_pending,
            last_error: self.last_error.clone(),
        }
    }

    /// Handles live in the slot only while the session is active
    fn holds_invariant(&self) -> bool {
        match self.machine.status() {
            SessionStatus::Active => self.screen.is_some() && self.audio.is_some(),
            _ => self.screen.is_none() && self.audio.is_none(),
        }
    }
}

pub struct CaptureSessionManager<B, S> {
    backend: B,
    sink: S,
    slot: Mutex<SessionSlot>,
    updates: watch::Sender<SessionSnapshot>,
}

impl<B: CaptureBackend, S: DisplaySink> CaptureSessionManager<B, S> {
    pub fn new(backend: B, sink: S) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::idle());
        Self {
            backend,
            sink,
            slot: Mutex::new(SessionSlot::default()),
            updates,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn status(&self) -> SessionStatus {
        self.slot.lock().machine.status()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.updates.borrow().clone()
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    /// Acquire the screen, then the microphone, as one session.
    ///
    /// The microphone is only requested once the screen request has settled
    /// successfully. If the microphone fails, the screen handle is released
    /// before the session returns to `Idle`.
    pub async fn start(&self, config: &CaptureConfig) -> Result<SessionSnapshot, CaptureError> {
        config
            .validate()
            .map_err(|e| CaptureError::new(ErrorCode::InvalidConfig, e.to_string()))?;

        let attempt = self.begin_attempt()?;

        let request = DisplayMediaRequest::from_config(config);
        info!("Requesting screen stream (request {})", request.id);

        let screen = match self.backend.acquire_screen(&request).await {
            Ok(handle) => handle,
            Err(err) => return Err(attempt.fail(&err, None)),
        };

        // From here until commit, dropping `screen` is the rollback.
        info!("Screen stream {} acquired, requesting microphone", screen.id());

        let audio = match self.backend.acquire_microphone(&config.audio).await {
            Ok(handle) => handle,
            Err(err) => return Err(attempt.fail(&err, Some(screen))),
        };

        Ok(attempt.commit(screen, audio))
    }

    /// Release both handles and unbind the preview.
    ///
    /// Safe from any state. While a start is still requesting, the stop is
    /// recorded and applied as soon as the start settles.
    pub fn stop(&self) -> SessionSnapshot {
        let mut slot = self.slot.lock();
        match slot.machine.status() {
            SessionStatus::Active => {
                let handles = self.detach_all(&mut slot);
                drop(slot);
                return self.finish_stop(handles);
            }
            SessionStatus::Requesting => {
                if !slot.stop_pending {
                    info!("Stop requested during acquisition; deferring until it settles");
                    slot.stop_pending = true;
                    self.publish(&slot);
                }
            }
            status => debug!("Stop requested with no live session ({:?})", status),
        }
        slot.snapshot()
    }

    fn begin_attempt(&self) -> Result<StartAttempt<'_, B, S>, CaptureError> {
        let mut slot = self.slot.lock();
        let status = slot.machine.status();
        if status != SessionStatus::Idle {
            warn!("Rejecting start while session is {:?}", status);
            return Err(CaptureError::already_active(status));
        }

        slot.machine
            .begin_request()
            .map_err(|_| CaptureError::already_active(status))?;
        slot.stop_pending = false;
        slot.last_error = None;
        self.publish(&slot);

        Ok(StartAttempt::new(self))
    }

    fn settle_success(
        &self,
        screen: MediaStreamHandle,
        audio: MediaStreamHandle,
    ) -> SessionSnapshot {
        let mut slot = self.slot.lock();
        slot.audio = Some(audio);
        self.replace_screen(&mut slot, Some(screen));
        self.step(&mut slot, StateMachine::activate);
        info!("Capture session active");

        if !std::mem::take(&mut slot.stop_pending) {
            return slot.snapshot();
        }

        info!("Applying stop requested during acquisition");
        let handles = self.detach_all(&mut slot);
        drop(slot);
        self.finish_stop(handles)
    }

    fn settle_failure(&self, screen: Option<MediaStreamHandle>, error: CaptureError) {
        {
            let mut slot = self.slot.lock();
            warn!("Capture start failed ({:?}): {}", error.code, error.message);
            slot.last_error = Some(error);
            slot.stop_pending = false;
            self.step(&mut slot, StateMachine::fail);
        }

        // Stopping a track can block on the device
        if let Some(screen) = screen {
            info!("Rolling back screen stream {}", screen.id());
            screen.release();
        }

        let mut slot = self.slot.lock();
        self.step(&mut slot, StateMachine::settle);
    }

    fn abandon(&self) {
        let mut slot = self.slot.lock();
        warn!("Capture start abandoned before it settled");
        slot.stop_pending = false;
        self.step(&mut slot, StateMachine::settle);
    }

    /// Take both handles out of the slot and enter `Stopping`. The caller
    /// releases them once the lock is dropped.
    fn detach_all(&self, slot: &mut SessionSlot) -> Vec<MediaStreamHandle> {
        let screen = self.replace_screen(slot, None);
        let audio = slot.audio.take();
        self.step(slot, StateMachine::begin_stop);
        screen.into_iter().chain(audio).collect()
    }

    fn finish_stop(&self, handles: Vec<MediaStreamHandle>) -> SessionSnapshot {
        for handle in handles {
            handle.release();
        }

        let mut slot = self.slot.lock();
        self.step(&mut slot, StateMachine::settle);
        info!("Capture session stopped");
        slot.snapshot()
    }

    /// The only writer of the screen handle, so the sink always mirrors it
    fn replace_screen(
        &self,
        slot: &mut SessionSlot,
        screen: Option<MediaStreamHandle>,
    ) -> Option<MediaStreamHandle> {
        let previous = std::mem::replace(&mut slot.screen, screen);
        self.sink.bind(slot.screen.as_ref().map(MediaStreamHandle::preview));
        previous
    }

    fn step(
        &self,
        slot: &mut SessionSlot,
        transition: impl FnOnce(&mut StateMachine) -> Result<SessionStatus, TransitionError>,
    ) {
        if let Err(err) = transition(&mut slot.machine) {
            warn!("{}", err);
        }
        self.publish(slot);
    }

    fn publish(&self, slot: &SessionSlot) {
        debug_assert!(
            slot.holds_invariant(),
            "session handles out of sync with {:?}",
            slot.machine.status()
        );
        self.updates.send_replace(slot.snapshot());
    }
}
