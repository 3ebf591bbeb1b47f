//! Hardware-free capture backend producing test patterns.
//!
//! Used by tests and headless tools. It records how often each source was
//! opened and which feeds are still running, so reference counting can be
//! checked against "hardware" state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use director_common::error::{CaptureError, DirectorResult};
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::backend::{
    CameraDevice, CaptureBackend, CaptureConstraints, CaptureFeed, CaptureRequest, VideoFrame,
};

const DEFAULT_NATIVE_SIZE: (u32, u32) = (1280, 720);

const BAR_COLORS: [[u8; 4]; 6] = [
    [255, 0, 0, 255],   // Red
    [0, 255, 0, 255],   // Green
    [0, 0, 255, 255],   // Blue
    [255, 255, 0, 255], // Yellow
    [255, 0, 255, 255], // Magenta
    [0, 255, 255, 255], // Cyan
];

/// A feed serving one static pattern.
pub struct SyntheticFeed {
    image: Arc<RgbaImage>,
    ready: AtomicBool,
    live: AtomicBool,
    sequence: AtomicU64,
}

impl SyntheticFeed {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            ready: AtomicBool::new(true),
            live: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
        }
    }

    /// A feed of one solid color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    /// Toggle whether a decodable frame is available.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Simulate the device being unplugged.
    pub fn remove_device(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

impl CaptureFeed for SyntheticFeed {
    fn latest_frame(&self) -> Option<VideoFrame> {
        if !self.live.load(Ordering::SeqCst) || !self.ready.load(Ordering::SeqCst) {
            return None;
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        Some(VideoFrame::new(Arc::clone(&self.image), sequence))
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.image.dimensions())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Color bars, rotated by a hash of `seed` so different sources differ.
pub fn color_bars(width: u32, height: u32, seed: &str) -> RgbaImage {
    let offset = seed.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
    let bar_width = (width / BAR_COLORS.len() as u32).max(1);
    RgbaImage::from_fn(width, height, |x, _| {
        let bar = (x / bar_width) as usize;
        Rgba(BAR_COLORS[(bar + offset) % BAR_COLORS.len()])
    })
}

/// Capture backend backed by [`SyntheticFeed`]s.
#[derive(Default)]
pub struct SyntheticBackend {
    cameras: Vec<CameraDevice>,
    native_sizes: HashMap<String, (u32, u32)>,
    strict_aspect: HashSet<String>,
    start_unready: HashSet<String>,
    failures: Mutex<HashMap<String, CaptureError>>,
    attempts: Mutex<HashMap<String, u32>>,
    opens: Mutex<HashMap<String, u32>>,
    feeds: Mutex<HashMap<String, Vec<Arc<SyntheticFeed>>>>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a camera that accepts any constraints.
    pub fn with_camera(mut self, device_id: &str, name: &str) -> Self {
        self.cameras.push(CameraDevice {
            device_id: device_id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Add a camera that rejects any aspect ratio other than its native one.
    pub fn with_strict_camera(mut self, device_id: &str, name: &str, native: (u32, u32)) -> Self {
        self.strict_aspect.insert(device_id.to_string());
        self.native_sizes.insert(device_id.to_string(), native);
        self.with_camera(device_id, name)
    }

    /// Frame size for a window or screen capture.
    pub fn with_source_size(mut self, capture_id: &str, size: (u32, u32)) -> Self {
        self.native_sizes.insert(capture_id.to_string(), size);
        self
    }

    /// Feeds for this source open without a decodable frame until
    /// [`SyntheticFeed::set_ready`] is called.
    pub fn with_unready_source(mut self, capture_id: &str) -> Self {
        self.start_unready.insert(capture_id.to_string());
        self
    }

    /// Make every subsequent open of `source_id` fail with `error`.
    pub fn fail_with(&self, source_id: &str, error: CaptureError) {
        self.failures.lock().insert(source_id.to_string(), error);
    }

    pub fn clear_failure(&self, source_id: &str) {
        self.failures.lock().remove(source_id);
    }

    /// Open calls made for a source, successful or not.
    pub fn open_attempts(&self, source_id: &str) -> u32 {
        self.attempts.lock().get(source_id).copied().unwrap_or(0)
    }

    /// Successful hardware opens for a source.
    pub fn open_count(&self, source_id: &str) -> u32 {
        self.opens.lock().get(source_id).copied().unwrap_or(0)
    }

    /// Feeds of a source that are still running.
    pub fn live_feed_count(&self, source_id: &str) -> usize {
        self.feeds
            .lock()
            .get(source_id)
            .map(|feeds| feeds.iter().filter(|f| f.is_live()).count())
            .unwrap_or(0)
    }

    /// Most recently opened feed of a source.
    pub fn feed(&self, source_id: &str) -> Option<Arc<SyntheticFeed>> {
        self.feeds
            .lock()
            .get(source_id)
            .and_then(|feeds| feeds.last().cloned())
    }

    fn frame_size(&self, request: &CaptureRequest) -> Result<(u32, u32), CaptureError> {
        match &request.constraints {
            CaptureConstraints::Camera {
                device_id,
                ideal_width,
                ideal_height,
                aspect_ratio,
                ..
            } => {
                let native = self
                    .native_sizes
                    .get(device_id)
                    .copied()
                    .unwrap_or(DEFAULT_NATIVE_SIZE);
                match aspect_ratio {
                    Some(aspect) if self.strict_aspect.contains(device_id) => {
                        let native_aspect = native.0 as f64 / native.1.max(1) as f64;
                        if (native_aspect - aspect).abs() > 0.01 {
                            return Err(CaptureError::Overconstrained {
                                source_id: request.source_id.clone(),
                                constraint: "aspectRatio".to_string(),
                            });
                        }
                        Ok((*ideal_width, *ideal_height))
                    }
                    Some(_) => Ok((*ideal_width, *ideal_height)),
                    None => Ok(native),
                }
            }
            CaptureConstraints::Desktop { capture_id, .. } => Ok(self
                .native_sizes
                .get(capture_id)
                .copied()
                .unwrap_or(DEFAULT_NATIVE_SIZE)),
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for SyntheticBackend {
    async fn enumerate_cameras(&self) -> DirectorResult<Vec<CameraDevice>> {
        Ok(self.cameras.clone())
    }

    async fn open(&self, request: &CaptureRequest) -> Result<Arc<dyn CaptureFeed>, CaptureError> {
        let source_id = request.source_id.clone();
        *self.attempts.lock().entry(source_id.clone()).or_insert(0) += 1;

        if let Some(error) = self.failures.lock().get(&source_id) {
            return Err(error.clone());
        }

        let (width, height) = self.frame_size(request)?;
        let feed = Arc::new(SyntheticFeed::new(color_bars(width, height, &source_id)));
        let capture_id = match &request.constraints {
            CaptureConstraints::Camera { device_id, .. } => device_id,
            CaptureConstraints::Desktop { capture_id, .. } => capture_id,
        };
        if self.start_unready.contains(capture_id) {
            feed.set_ready(false);
        }

        *self.opens.lock().entry(source_id.clone()).or_insert(0) += 1;
        self.feeds
            .lock()
            .entry(source_id.clone())
            .or_default()
            .push(Arc::clone(&feed));
        tracing::debug!(%source_id, width, height, "Synthetic capture opened");
        Ok(feed)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_bars_differ_by_seed() {
        let a = color_bars(60, 10, "cam1");
        let b = color_bars(60, 10, "cam2");
        assert_eq!(a.dimensions(), (60, 10));
        assert_ne!(a.get_pixel(0, 0), b.get_pixel(0, 0));
    }

    #[test]
    fn test_unready_feed_yields_no_frame() {
        let feed = SyntheticFeed::solid(4, 4, [1, 2, 3, 255]);
        feed.set_ready(false);
        assert!(feed.latest_frame().is_none());
        feed.set_ready(true);
        assert!(feed.latest_frame().is_some());
        feed.stop();
        assert!(feed.latest_frame().is_none());
    }
}
