//! Platform capture contracts.
//!
//! A [`CaptureBackend`] opens hardware (camera devices, desktop capture) and
//! hands back a [`CaptureFeed`]: a running capture that can be sampled for
//! its most recent frame and stopped.

use std::sync::Arc;

use director_common::config::CaptureDefaults;
use director_common::error::{CaptureError, DirectorResult};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::registry::MediaSourceKind;

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    image: Arc<RgbaImage>,
    sequence: u64,
}

impl VideoFrame {
    pub fn new(image: Arc<RgbaImage>, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Monotonic frame counter of the producing feed.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// A running capture.
///
/// Implementations are shared between every consumer of a source, so
/// sampling must not consume the frame.
pub trait CaptureFeed: Send + Sync {
    /// The most recent decodable frame, `None` while not enough data is buffered.
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Negotiated frame size, once known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// False once the device went away or the feed was stopped.
    fn is_live(&self) -> bool;

    /// Stop the hardware capture. Idempotent.
    fn stop(&self);
}

/// Caller-side capture configuration.
///
/// The first successful capture of a source fixes its configuration; later
/// requests share the running capture whatever they ask for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_aspect: f64,
    pub frame_rate: Option<u32>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from(&CaptureDefaults::default())
    }
}

impl From<&CaptureDefaults> for CaptureConfig {
    fn from(defaults: &CaptureDefaults) -> Self {
        Self {
            ideal_width: defaults.ideal_width,
            ideal_height: defaults.ideal_height,
            ideal_aspect: defaults.ideal_aspect,
            frame_rate: defaults.frame_rate,
        }
    }
}

/// Device-level constraints sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureConstraints {
    /// A camera selected by device id.
    Camera {
        device_id: String,
        ideal_width: u32,
        ideal_height: u32,
        /// `None` accepts the device's native aspect ratio.
        aspect_ratio: Option<f64>,
        frame_rate: Option<u32>,
    },
    /// Desktop capture of a window or screen by its opaque capture id.
    /// Resolution is left to the source.
    Desktop {
        capture_id: String,
        frame_rate: Option<u32>,
    },
}

impl CaptureConstraints {
    /// Constraints for a source of the given kind.
    pub fn for_source(kind: MediaSourceKind, capture_id: &str, config: &CaptureConfig) -> Self {
        match kind {
            MediaSourceKind::Camera => CaptureConstraints::Camera {
                device_id: capture_id.to_string(),
                ideal_width: config.ideal_width,
                ideal_height: config.ideal_height,
                aspect_ratio: Some(config.ideal_aspect),
                frame_rate: config.frame_rate,
            },
            MediaSourceKind::Window | MediaSourceKind::Screen => CaptureConstraints::Desktop {
                capture_id: capture_id.to_string(),
                frame_rate: config.frame_rate,
            },
        }
    }

    /// The same request without an aspect ratio, if it had one.
    pub fn without_aspect(&self) -> Option<Self> {
        match self {
            CaptureConstraints::Camera {
                device_id,
                ideal_width,
                ideal_height,
                aspect_ratio: Some(_),
                frame_rate,
            } => Some(CaptureConstraints::Camera {
                device_id: device_id.clone(),
                ideal_width: *ideal_width,
                ideal_height: *ideal_height,
                aspect_ratio: None,
                frame_rate: *frame_rate,
            }),
            _ => None,
        }
    }
}

/// A request to open one source.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub source_id: String,
    pub constraints: CaptureConstraints,
}

/// A camera reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub device_id: String,
    pub name: String,
}

/// Abstract interface for platform-specific capture.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Cameras currently attached.
    async fn enumerate_cameras(&self) -> DirectorResult<Vec<CameraDevice>>;

    /// Open a capture. Each successful call starts hardware.
    async fn open(&self, request: &CaptureRequest) -> Result<Arc<dyn CaptureFeed>, CaptureError>;

    /// Backend name.
    fn name(&self) -> &str;
}
