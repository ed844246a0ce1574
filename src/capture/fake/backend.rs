// Fake capture backend for testing
//
// Screen and microphone acquisitions succeed or fail as configured, every
// live track is counted, and either acquisition can be held open until the
// test releases it.

use crate::broker::{
    DisplayAuthorizationBroker, DisplayMediaRequest, HandlerRegistry, SourceDescriptor, SourceKind,
};
use crate::capture::{
    resolve_source, CaptureBackend, CaptureBackendError, MediaStreamHandle, MediaTrack,
    StreamKind, TrackKind,
};
use crate::config::AudioConstraints;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type StopHook = Arc<dyn Fn() + Send + Sync>;

/// How an acquisition should settle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOutcome {
    Succeed,
    PermissionDenied,
    NoDevice,
    DeviceBusy,
}

/// Configurable fake backend for testing
#[derive(Clone)]
pub struct FakeCaptureBackend {
    screen_outcome: Arc<Mutex<FakeOutcome>>,
    microphone_outcome: Arc<Mutex<FakeOutcome>>,
    /// Sources the "native picker" offers to the display media handler
    candidates: Arc<Mutex<Vec<SourceDescriptor>>>,
    handlers: Arc<HandlerRegistry>,
    screen_gate: Arc<Mutex<Option<Arc<Notify>>>>,
    microphone_gate: Arc<Mutex<Option<Arc<Notify>>>>,
    screen_requests: Arc<AtomicU32>,
    microphone_requests: Arc<AtomicU32>,
    /// Tracks created and not yet stopped
    live_tracks: Arc<AtomicU32>,
    /// Runs inside every track stop
    stop_hook: Arc<Mutex<Option<StopHook>>>,
    last_request: Arc<Mutex<Option<DisplayMediaRequest>>>,
    last_constraints: Arc<Mutex<Option<AudioConstraints>>>,
}

impl Default for FakeCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCaptureBackend {
    /// A backend with the broker installed and one monitor on offer
    pub fn new() -> Self {
        let handlers = HandlerRegistry::new();
        let _ = handlers.install(Arc::new(DisplayAuthorizationBroker));

        Self {
            screen_outcome: Arc::new(Mutex::new(FakeOutcome::Succeed)),
            microphone_outcome: Arc::new(Mutex::new(FakeOutcome::Succeed)),
            candidates: Arc::new(Mutex::new(vec![SourceDescriptor {
                id: "42".to_string(),
                name: "Built-in Display".to_string(),
                kind: SourceKind::Screen,
                width: Some(1920),
                height: Some(1080),
            }])),
            handlers: Arc::new(handlers),
            screen_gate: Arc::new(Mutex::new(None)),
            microphone_gate: Arc::new(Mutex::new(None)),
            screen_requests: Arc::new(AtomicU32::new(0)),
            microphone_requests: Arc::new(AtomicU32::new(0)),
            live_tracks: Arc::new(AtomicU32::new(0)),
            stop_hook: Arc::new(Mutex::new(None)),
            last_request: Arc::new(Mutex::new(None)),
            last_constraints: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a backend where both acquisitions succeed
    pub fn succeeding() -> Self {
        Self::new()
    }

    /// Create a backend where the user declines the screen picker
    pub fn screen_denied() -> Self {
        let backend = Self::new();
        backend.set_screen_outcome(FakeOutcome::PermissionDenied);
        backend
    }

    /// Create a backend where the screen succeeds and the microphone fails
    pub fn microphone_failing(outcome: FakeOutcome) -> Self {
        let backend = Self::new();
        backend.set_microphone_outcome(outcome);
        backend
    }

    /// Create a backend whose display media handler was never installed
    pub fn without_handler() -> Self {
        Self {
            handlers: Arc::new(HandlerRegistry::new()),
            ..Self::new()
        }
    }

    pub fn set_screen_outcome(&self, outcome: FakeOutcome) {
        *self.screen_outcome.lock().unwrap() = outcome;
    }

    pub fn set_microphone_outcome(&self, outcome: FakeOutcome) {
        *self.microphone_outcome.lock().unwrap() = outcome;
    }

    pub fn set_candidates(&self, candidates: Vec<SourceDescriptor>) {
        *self.candidates.lock().unwrap() = candidates;
    }

    /// Hold screen acquisitions until the returned notify fires
    pub fn hold_screen(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.screen_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold microphone acquisitions until the returned notify fires
    pub fn hold_microphone(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.microphone_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Call `hook` from inside each track's `stop`
    pub fn on_track_stop(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.stop_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    /// Get count of screen requests
    pub fn screen_requests(&self) -> u32 {
        self.screen_requests.load(Ordering::SeqCst)
    }

    /// Get count of microphone requests
    pub fn microphone_requests(&self) -> u32 {
        self.microphone_requests.load(Ordering::SeqCst)
    }

    /// Tracks handed out and not yet stopped
    pub fn live_tracks(&self) -> u32 {
        self.live_tracks.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<DisplayMediaRequest> {
        self.last_request.lock().unwrap().clone()
    }

    pub fn last_constraints(&self) -> Option<AudioConstraints> {
        self.last_constraints.lock().unwrap().clone()
    }

    fn check(outcome: &Mutex<FakeOutcome>, what: &str) -> Result<(), CaptureBackendError> {
        match *outcome.lock().unwrap() {
            FakeOutcome::Succeed => Ok(()),
            FakeOutcome::PermissionDenied => Err(CaptureBackendError::PermissionDenied(format!(
                "User declined {} capture",
                what
            ))),
            FakeOutcome::NoDevice => Err(CaptureBackendError::NoSourceAvailable(format!(
                "No {} device found",
                what
            ))),
            FakeOutcome::DeviceBusy => Err(CaptureBackendError::DeviceBusy(format!(
                "{} device in use",
                what
            ))),
        }
    }

    fn track(&self, kind: TrackKind, label: &str) -> Box<dyn MediaTrack> {
        self.live_tracks.fetch_add(1, Ordering::SeqCst);
        Box::new(FakeTrack {
            kind,
            label: label.to_string(),
            live: true,
            live_tracks: Arc::clone(&self.live_tracks),
            stop_hook: Arc::clone(&self.stop_hook),
        })
    }

    async fn pass(gate: &Mutex<Option<Arc<Notify>>>) {
        let gate = gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }
}

impl CaptureBackend for FakeCaptureBackend {
    async fn acquire_screen(
        &self,
        request: &DisplayMediaRequest,
    ) -> Result<MediaStreamHandle, CaptureBackendError> {
        self.screen_requests.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        Self::pass(&self.screen_gate).await;
        Self::check(&self.screen_outcome, "screen")?;

        let candidates = self.candidates.lock().unwrap().clone();
        let source = resolve_source(&self.handlers, request, &candidates)?;

        let track = self.track(TrackKind::Video, &source.name);
        Ok(MediaStreamHandle::new(StreamKind::Screen, vec![track]).with_source(source))
    }

    async fn acquire_microphone(
        &self,
        constraints: &AudioConstraints,
    ) -> Result<MediaStreamHandle, CaptureBackendError> {
        self.microphone_requests.fetch_add(1, Ordering::SeqCst);
        *self.last_constraints.lock().unwrap() = Some(constraints.clone());

        Self::pass(&self.microphone_gate).await;
        Self::check(&self.microphone_outcome, "microphone")?;

        let label = constraints.device.as_deref().unwrap_or("Default Microphone");
        let track = self.track(TrackKind::Audio, label);
        Ok(MediaStreamHandle::new(StreamKind::Microphone, vec![track]))
    }
}

struct FakeTrack {
    kind: TrackKind,
    label: String,
    live: bool,
    live_tracks: Arc<AtomicU32>,
    stop_hook: Arc<Mutex<Option<StopHook>>>,
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if self.live {
            self.live = false;
            self.live_tracks.fetch_sub(1, Ordering::SeqCst);

            let hook = self.stop_hook.lock().unwrap().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }
}
