use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Frame-rate range requested for the screen stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRateRange {
    pub ideal: u8,
    pub max: u8,
}

impl Default for FrameRateRange {
    fn default() -> Self {
        Self { ideal: 30, max: 60 }
    }
}

impl FrameRateRange {
    /// Rate the platform should deliver when it can honour the ideal
    pub fn effective(&self) -> u8 {
        self.ideal.min(self.max)
    }
}

/// Which kinds of display sources may be offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilter {
    pub screens: bool,
    pub windows: bool,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            screens: true,
            windows: true,
        }
    }
}

/// Screen stream constraints. Audio is never bundled with the screen stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConstraints {
    pub frame_rate: FrameRateRange,
    /// Include cursor in capture
    pub include_cursor: bool,
    pub sources: SourceFilter,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            frame_rate: FrameRateRange::default(),
            include_cursor: true,
            sources: SourceFilter::default(),
        }
    }
}

/// Microphone stream constraints. Video is never requested with the microphone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioConstraints {
    /// Platform device name; `None` uses the default input
    pub device: Option<String>,
}

/// Configuration for a capture session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaptureConfig {
    pub video: VideoConstraints,
    pub audio: AudioConstraints,
}

/// Environment variable holding a JSON `PreviewConfig` override
pub const PREVIEW_ENV: &str = "LIVECAPTURE_PREVIEW";

/// Preview forwarding settings, fixed at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Width the preview is scaled to; height follows the aspect ratio
    pub width: u32,
    /// Upper bound on frames forwarded to the webview per second
    pub max_fps: u8,
    pub jpeg_quality: u8,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 960,
            max_fps: 15,
            jpeg_quality: 70,
        }
    }
}

/// Validation error for configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl CaptureConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = &self.video.frame_rate;
        if rate.max == 0 || rate.max > 60 {
            return Err(ConfigError::new(
                "video.frame_rate.max",
                "Maximum frame rate must be between 1 and 60",
            ));
        }
        if rate.ideal == 0 || rate.ideal > rate.max {
            return Err(ConfigError::new(
                "video.frame_rate.ideal",
                "Ideal frame rate must be between 1 and the maximum",
            ));
        }

        let sources = &self.video.sources;
        if !sources.screens && !sources.windows {
            return Err(ConfigError::new(
                "video.sources",
                "At least one of screens or windows must be allowed",
            ));
        }

        if matches!(&self.audio.device, Some(name) if name.trim().is_empty()) {
            return Err(ConfigError::new("audio.device", "Device name cannot be empty"));
        }

        Ok(())
    }
}

impl PreviewConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(160..=3840).contains(&self.width) {
            return Err(ConfigError::new(
                "preview.width",
                "Preview width must be between 160 and 3840",
            ));
        }
        if self.max_fps == 0 || self.max_fps > 30 {
            return Err(ConfigError::new(
                "preview.max_fps",
                "Preview FPS must be between 1 and 30",
            ));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::new(
                "preview.jpeg_quality",
                "JPEG quality must be between 1 and 100",
            ));
        }
        Ok(())
    }

    /// Startup preview settings from an optional JSON override.
    ///
    /// Missing fields keep their defaults; an unparsable or out-of-range
    /// override is logged and ignored.
    pub fn load(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        match serde_json::from_str::<Self>(raw) {
            Ok(config) => config.or_default(),
            Err(e) => {
                warn!("Ignoring {}: {}", PREVIEW_ENV, e);
                Self::default()
            }
        }
    }

    /// This config if it validates, the defaults otherwise
    pub fn or_default(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(err) => {
                warn!("Invalid preview config ({}); using defaults", err);
                Self::default()
            }
        }
    }
}
