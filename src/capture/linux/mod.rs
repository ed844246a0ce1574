// Linux capture backend using xdg-desktop-portal and PipeWire
//
// The screen comes from the Freedesktop screencast portal (Wayland and X11)
// and is previewed through a GStreamer pipeline; the microphone is opened
// directly through GStreamer.

mod backend;
mod elements;
mod pipeline;
mod tracks;

pub use backend::LinuxCaptureBackend;
pub use elements::detect_microphone_source;
