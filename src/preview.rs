// Display sink for the live screen preview

use crate::capture::StreamInfo;
use crate::config::PreviewConfig;
use crate::events::{event_names, PreviewBoundEvent, PreviewFrameEvent};
use base64::Engine;
use image::error::{ImageError, ParameterError, ParameterErrorKind};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tauri::{AppHandle, Emitter};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Latest decoded frame of a screen stream, tightly packed RGBA
#[derive(Clone, PartialEq, Eq)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub type FrameReceiver = watch::Receiver<Option<Arc<PreviewFrame>>>;
pub type FrameSender = watch::Sender<Option<Arc<PreviewFrame>>>;

impl PreviewFrame {
    /// Copy an RGBA buffer whose rows may be padded to `stride` bytes
    pub fn from_padded_rgba(width: u32, height: u32, stride: usize, data: &[u8]) -> Option<Self> {
        let row = width as usize * 4;
        if width == 0 || height == 0 || stride < row {
            return None;
        }
        let needed = stride * (height as usize - 1) + row;
        if data.len() < needed {
            return None;
        }

        let rgba = if stride == row {
            data[..row * height as usize].to_vec()
        } else {
            data.chunks(stride)
                .take(height as usize)
                .flat_map(|line| &line[..row])
                .copied()
                .collect()
        };

        Some(Self {
            width,
            height,
            rgba,
        })
    }

    /// Encode as a `data:image/jpeg;base64,...` URL for the webview
    pub fn to_jpeg_data_url(&self, quality: u8) -> Result<String, ImageError> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
            .ok_or_else(|| {
                ImageError::Parameter(ParameterError::from_kind(
                    ParameterErrorKind::DimensionMismatch,
                ))
            })?;
        let rgb = image::DynamicImage::ImageRgba8(image).to_rgb8();

        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode_image(&rgb)?;

        Ok(format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&jpeg)
        ))
    }
}

impl fmt::Debug for PreviewFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

/// What a sink sees of the bound stream. Does not own the stream.
#[derive(Debug, Clone)]
pub struct PreviewSource {
    pub stream: StreamInfo,
    pub frames: Option<FrameReceiver>,
}

/// Rendering surface for the session's screen stream.
///
/// Holds at most one binding; each call replaces the previous one.
pub trait DisplaySink: Send + Sync {
    fn bind(&self, source: Option<PreviewSource>);
}

/// Sink that forwards the bound stream to the webview as events
pub struct TauriPreviewSink {
    app: AppHandle,
    config: PreviewConfig,
    forwarder: Mutex<Option<tauri::async_runtime::JoinHandle<()>>>,
}

impl TauriPreviewSink {
    pub fn new(app: AppHandle, config: PreviewConfig) -> Self {
        Self {
            app,
            config,
            forwarder: Mutex::new(None),
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.config.max_fps.max(1)))
    }
}

impl DisplaySink for TauriPreviewSink {
    fn bind(&self, source: Option<PreviewSource>) {
        let mut forwarder = self.forwarder.lock();
        if let Some(task) = forwarder.take() {
            task.abort();
        }

        let _ = self.app.emit(
            event_names::PREVIEW_BOUND,
            PreviewBoundEvent {
                stream: source.as_ref().map(|s| s.stream.clone()),
            },
        );

        let Some(PreviewSource {
            stream,
            frames: Some(mut frames),
        }) = source
        else {
            return;
        };

        let app = self.app.clone();
        let interval = self.frame_interval();
        let quality = self.config.jpeg_quality;
        let stream_id = stream.id;

        debug!("Forwarding preview frames for stream {}", stream_id);

        *forwarder = Some(tauri::async_runtime::spawn(async move {
            while frames.changed().await.is_ok() {
                let latest = frames.borrow_and_update().clone();
                if let Some(frame) = latest {
                    match frame.to_jpeg_data_url(quality) {
                        Ok(data_url) => {
                            let _ = app.emit(
                                event_names::PREVIEW_FRAME,
                                PreviewFrameEvent {
                                    stream_id,
                                    width: frame.width,
                                    height: frame.height,
                                    data_url,
                                },
                            );
                        }
                        Err(e) => warn!("Failed to encode preview frame: {}", e),
                    }
                }
                tokio::time::sleep(interval).await;
            }
            debug!("Preview frames ended for stream {}", stream_id);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_frame_is_copied_verbatim() {
        let data: Vec<u8> = (0..2 * 2 * 4).collect();
        let frame = PreviewFrame::from_padded_rgba(2, 2, 8, &data).unwrap();
        assert_eq!(frame.rgba, data);
    }

    #[test]
    fn test_row_padding_is_stripped() {
        // 1x2 image, 4 bytes per row plus 4 bytes padding
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        let frame = PreviewFrame::from_padded_rgba(1, 2, 8, &data).unwrap();
        assert_eq!(frame.rgba, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_last_row_padding_is_optional() {
        let data = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8];
        let frame = PreviewFrame::from_padded_rgba(1, 2, 8, &data).unwrap();
        assert_eq!(frame.rgba.len(), 8);
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        assert!(PreviewFrame::from_padded_rgba(2, 2, 8, &[0; 10]).is_none());
        assert!(PreviewFrame::from_padded_rgba(2, 2, 4, &[0; 16]).is_none());
        assert!(PreviewFrame::from_padded_rgba(0, 2, 0, &[]).is_none());
    }

    #[test]
    fn test_jpeg_data_url() {
        let frame = PreviewFrame {
            width: 8,
            height: 8,
            rgba: [100u8, 149, 237, 255].repeat(64),
        };
        let url = frame.to_jpeg_data_url(70).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn test_jpeg_rejects_mismatched_buffer() {
        let frame = PreviewFrame {
            width: 8,
            height: 8,
            rgba: vec![0; 10],
        };
        assert!(frame.to_jpeg_data_url(70).is_err());
    }
}
