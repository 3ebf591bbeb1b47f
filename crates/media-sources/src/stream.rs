//! Stream handles: consumer-side references to a live capture.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use director_common::error::CaptureError;

use crate::backend::{CaptureFeed, VideoFrame};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// The hardware capture behind every handle of one source.
pub(crate) struct SharedCapture {
    source_id: String,
    feed: Arc<dyn CaptureFeed>,
    stopped: AtomicBool,
}

impl SharedCapture {
    pub(crate) fn new(source_id: String, feed: Arc<dyn CaptureFeed>) -> Arc<Self> {
        Arc::new(Self {
            source_id,
            feed,
            stopped: AtomicBool::new(false),
        })
    }

    /// Stop every track of the underlying capture.
    pub(crate) fn stop_all(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.feed.stop();
            tracing::info!(source_id = %self.source_id, "Hardware capture stopped");
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.feed.is_live()
    }
}

/// A handle to a live video feed.
///
/// Cloning yields an independent consumer: the clone shares the hardware
/// capture but has its own playing/ended state, so stopping one handle
/// never ends a sibling. Only the [`MediaSourceManager`] can stop the
/// hardware itself.
///
/// [`MediaSourceManager`]: crate::manager::MediaSourceManager
pub struct StreamHandle {
    id: u64,
    shared: Arc<SharedCapture>,
    ended: bool,
    playing: bool,
}

impl StreamHandle {
    pub(crate) fn new(shared: Arc<SharedCapture>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            shared,
            ended: false,
            playing: false,
        }
    }

    pub(crate) fn shared(&self) -> Arc<SharedCapture> {
        Arc::clone(&self.shared)
    }

    /// Process-unique id of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source_id(&self) -> &str {
        &self.shared.source_id
    }

    /// Whether two handles are backed by the same hardware capture.
    pub fn shares_capture_with(&self, other: &StreamHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// True while this handle can still deliver frames.
    pub fn is_active(&self) -> bool {
        !self.ended && self.shared.is_live()
    }

    pub fn is_playing(&self) -> bool {
        self.playing && self.is_active()
    }

    /// Start consuming frames.
    pub fn play(&mut self) -> Result<(), CaptureError> {
        if self.ended {
            return Err(CaptureError::unavailable(
                self.source_id(),
                "stream handle already stopped",
            ));
        }
        if !self.shared.is_live() {
            return Err(CaptureError::DeviceRemoved {
                source_id: self.source_id().to_string(),
            });
        }
        self.playing = true;
        Ok(())
    }

    /// Pause consumption without ending the handle.
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// End this handle's tracks. Siblings and the hardware are unaffected.
    pub fn stop(&mut self) {
        self.playing = false;
        self.ended = true;
    }

    /// Current frame, `None` unless playing and the feed has decodable data.
    pub fn current_frame(&self) -> Option<VideoFrame> {
        if !self.is_playing() {
            return None;
        }
        self.shared.feed.latest_frame()
    }

    /// Frame size negotiated by the capture, once known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.shared.feed.dimensions()
    }
}

impl Clone for StreamHandle {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.shared))
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("source_id", &self.shared.source_id)
            .field("ended", &self.ended)
            .field("playing", &self.playing)
            .finish()
    }
}
