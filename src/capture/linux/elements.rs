use crate::broker::SourceKind;
use crate::config::SourceFilter;
use ashpd::desktop::screencast::SourceType;
use ashpd::enumflags2::BitFlags;
use tracing::{debug, warn};

/// Audio source elements in order of preference
pub(super) const MIC_SOURCES: &[&str] = &[
    "pulsesrc",     // PulseAudio, or PipeWire through pipewire-pulse
    "pipewiresrc",  // native PipeWire
    "autoaudiosrc", // whatever the registry ranks highest
];

/// Name given to the preview appsink so it can be looked up after parsing
pub(super) const PREVIEW_SINK: &str = "preview";

const CLIENT_NAME: &str = "livecapture";

/// Detect the first audio source element that can actually be created
pub fn detect_microphone_source() -> Option<&'static str> {
    if gstreamer::init().is_err() {
        warn!("Failed to initialize GStreamer for audio source detection");
        return None;
    }

    for source in MIC_SOURCES {
        if let Some(factory) = gstreamer::ElementFactory::find(source) {
            if factory.create().build().is_ok() {
                debug!("Found available audio source: {}", source);
                return Some(source);
            }
        }
    }

    warn!("No audio source element found in GStreamer registry");
    None
}

/// Portal source types for the kinds a request allows
pub(super) fn source_types(filter: &SourceFilter) -> BitFlags<SourceType> {
    let mut types = BitFlags::empty();
    if filter.screens {
        types.insert(SourceType::Monitor);
    }
    if filter.windows {
        types.insert(SourceType::Window);
    }
    types
}

/// Virtual outputs are offered as screens
pub(super) fn source_kind(source_type: Option<SourceType>) -> SourceKind {
    match source_type {
        Some(SourceType::Window) => SourceKind::Window,
        _ => SourceKind::Screen,
    }
}

/// `pipewiresrc ! videorate ! videoconvert ! videoscale ! RGBA ! appsink`
///
/// Frames are scaled to `width` keeping the aspect ratio, and the appsink
/// only ever holds the newest one.
pub(super) fn preview_description(fd: i32, node_id: u32, fps: u8, width: u32) -> String {
    format!(
        "pipewiresrc fd={fd} path={node_id} client-name={CLIENT_NAME} do-timestamp=true ! \
         videorate ! \
         videoconvert ! \
         videoscale ! \
         video/x-raw,format=RGBA,width={width},pixel-aspect-ratio=1/1,framerate={fps}/1 ! \
         appsink name={PREVIEW_SINK} max-buffers=1 drop=true sync=false"
    )
}

/// `source ! audioconvert ! fakesink`, optionally pinned to one device
pub(super) fn microphone_description(source: &str, device: Option<&str>) -> String {
    let device = match (device_property(source), device) {
        (Some(property), Some(device)) => {
            format!(" {}=\"{}\"", property, device.replace('"', "\\\""))
        }
        (None, Some(device)) => {
            warn!("{} cannot select a device; ignoring {:?}", source, device);
            String::new()
        }
        (_, None) => String::new(),
    };

    format!("{source}{device} ! audioconvert ! fakesink sync=false")
}

fn device_property(source: &str) -> Option<&'static str> {
    match source {
        "pulsesrc" => Some("device"),
        "pipewiresrc" => Some("target-object"),
        _ => None,
    }
}
