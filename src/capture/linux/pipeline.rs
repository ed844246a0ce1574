use crate::capture::CaptureBackendError;
use crate::preview::{FrameReceiver, FrameSender, PreviewFrame};
use gstreamer::glib;
use gstreamer::prelude::*;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// How long a pipeline may take to reach `Playing`
pub(super) const START_TIMEOUT_SECS: u64 = 10;

/// Initialize GStreamer (safe to call multiple times)
pub(super) fn init() -> Result<(), CaptureBackendError> {
    gstreamer::init().map_err(|e| {
        CaptureBackendError::Internal(format!("Failed to initialize GStreamer: {}", e))
    })
}

pub(super) fn build(description: &str) -> Result<gstreamer::Pipeline, CaptureBackendError> {
    debug!("Creating GStreamer pipeline: {}", description);

    let pipeline = gstreamer::parse::launch(description).map_err(|e| {
        if e.matches(gstreamer::ParseError::NoSuchElement) {
            CaptureBackendError::NoSourceAvailable(format!("Missing GStreamer element: {}", e))
        } else {
            CaptureBackendError::Internal(format!("Failed to create pipeline: {}", e))
        }
    })?;

    pipeline
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| CaptureBackendError::Internal("Failed to downcast to Pipeline".to_string()))
}

/// Bring the pipeline to `Playing` and wait until it gets there.
///
/// Blocks on the bus; run it off the async executor. On failure the
/// pipeline is already back in `Null`.
pub(super) fn start(pipeline: &gstreamer::Pipeline) -> Result<(), CaptureBackendError> {
    let result = play_and_wait(pipeline);
    if result.is_err() {
        let _ = pipeline.set_state(gstreamer::State::Null);
    }
    result
}

fn play_and_wait(pipeline: &gstreamer::Pipeline) -> Result<(), CaptureBackendError> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| CaptureBackendError::Internal("Failed to get pipeline bus".to_string()))?;

    if pipeline.set_state(gstreamer::State::Playing).is_err() {
        // The bus usually says why
        return Err(pending_error(&bus).unwrap_or_else(|| {
            CaptureBackendError::Internal("Failed to start pipeline".to_string())
        }));
    }

    loop {
        match bus.timed_pop(gstreamer::ClockTime::from_seconds(START_TIMEOUT_SECS)) {
            Some(msg) => {
                use gstreamer::MessageView;
                match msg.view() {
                    MessageView::Error(err) => {
                        let debug_info = err
                            .debug()
                            .map(|d| format!(" ({:?})", d))
                            .unwrap_or_default();
                        error!("Pipeline error: {}{}", err.error(), debug_info);
                        return Err(classify(&err.error()));
                    }
                    MessageView::StateChanged(state_changed) => {
                        let from_pipeline = state_changed
                            .src()
                            .map(|s| s == pipeline.upcast_ref::<gstreamer::Object>())
                            .unwrap_or(false);
                        if from_pipeline {
                            debug!(
                                "Pipeline state: {:?} -> {:?}",
                                state_changed.old(),
                                state_changed.current()
                            );
                            if state_changed.current() == gstreamer::State::Playing {
                                return Ok(());
                            }
                        }
                    }
                    MessageView::Eos(..) => {
                        return Err(CaptureBackendError::Internal(
                            "Pipeline ended before it started".to_string(),
                        ));
                    }
                    _ => {}
                }
            }
            None => {
                warn!("Pipeline timed out waiting for Playing");
                return Err(CaptureBackendError::DeviceBusy(
                    "Capture device did not start in time".to_string(),
                ));
            }
        }
    }
}

fn pending_error(bus: &gstreamer::Bus) -> Option<CaptureBackendError> {
    while let Some(msg) = bus.pop() {
        if let gstreamer::MessageView::Error(err) = msg.view() {
            error!("Pipeline error: {} ({:?})", err.error(), err.debug());
            return Some(classify(&err.error()));
        }
    }
    None
}

/// Map a GStreamer resource error onto the backend error taxonomy
pub(super) fn classify(error: &glib::Error) -> CaptureBackendError {
    let message = error.to_string();
    if error.matches(gstreamer::ResourceError::NotAuthorized) {
        CaptureBackendError::PermissionDenied(message)
    } else if error.matches(gstreamer::ResourceError::Busy) {
        CaptureBackendError::DeviceBusy(message)
    } else if error.matches(gstreamer::ResourceError::NotFound)
        || error.matches(gstreamer::ResourceError::OpenRead)
    {
        CaptureBackendError::NoSourceAvailable(message)
    } else {
        CaptureBackendError::Internal(message)
    }
}

/// Publish every frame reaching the named appsink as the latest preview frame
pub(super) fn attach_frames(
    pipeline: &gstreamer::Pipeline,
    sink_name: &str,
) -> Result<FrameReceiver, CaptureBackendError> {
    let appsink = pipeline
        .by_name(sink_name)
        .and_then(|element| element.dynamic_cast::<gstreamer_app::AppSink>().ok())
        .ok_or_else(|| {
            CaptureBackendError::Internal(format!("Pipeline has no appsink named {}", sink_name))
        })?;

    let (frames, receiver): (FrameSender, FrameReceiver) = watch::channel(None);
    appsink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                match frame_from_sample(&sample) {
                    Some(frame) => {
                        frames.send_replace(Some(Arc::new(frame)));
                    }
                    None => debug!("Dropping preview sample without usable video caps"),
                }
                Ok(gstreamer::FlowSuccess::Ok)
            })
            .build(),
    );

    Ok(receiver)
}

fn frame_from_sample(sample: &gstreamer::Sample) -> Option<PreviewFrame> {
    let info = gstreamer_video::VideoInfo::from_caps(sample.caps()?).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;
    let stride = usize::try_from(*info.stride().first()?).ok()?;

    PreviewFrame::from_padded_rgba(info.width(), info.height(), stride, map.as_slice())
}
