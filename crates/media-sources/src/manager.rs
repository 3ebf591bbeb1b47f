//! Reference-counted acquisition and release of capture handles.

use std::fmt;
use std::sync::Arc;

use director_common::error::{CaptureError, DirectorResult};
use director_platform_core::HostCapabilities;

use crate::backend::{CaptureBackend, CaptureConfig, CaptureConstraints, CaptureRequest};
use crate::registry::{MediaSourceKind, MediaSourceRegistry, ShareOutcome, SourceDescriptor};
use crate::stream::{SharedCapture, StreamHandle};

/// The only component that starts or stops capture hardware.
///
/// `capture` hands out clones of a single running capture per source and
/// counts them; `release` stops the hardware when the last one goes.
pub struct MediaSourceManager {
    registry: Arc<MediaSourceRegistry>,
    backend: Arc<dyn CaptureBackend>,
    // Serializes hardware opens so two concurrent requests for the same
    // source cannot both miss the registry and open twice.
    open_lock: tokio::sync::Mutex<()>,
}

impl MediaSourceManager {
    pub fn new(registry: Arc<MediaSourceRegistry>, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            registry,
            backend,
            open_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<MediaSourceRegistry> {
        &self.registry
    }

    /// Acquire a consumer handle for `source_id`.
    ///
    /// If the source is already capturing, its count is incremented and a
    /// clone of the running capture is returned. Otherwise the backend opens
    /// it (cameras ask for the configured ideal resolution at 16:9 and fall
    /// back to the device's native aspect; windows and screens are requested
    /// by capture id without a resolution) and it is stored with a count of
    /// one. Failures are returned as-is; nothing is retried.
    pub async fn capture(
        &self,
        source_id: &str,
        config: &CaptureConfig,
    ) -> Result<StreamHandle, CaptureError> {
        let _guard = self.open_lock.lock().await;

        let descriptor = match self.registry.try_share(source_id, config) {
            ShareOutcome::Shared {
                handle,
                config_matches,
            } => {
                if !config_matches {
                    tracing::warn!(
                        source_id,
                        "Capture requested with a different config than the running capture; sharing it unchanged"
                    );
                }
                tracing::debug!(
                    source_id,
                    reference_count = self.registry.reference_count(source_id),
                    "Sharing running capture"
                );
                return Ok(handle);
            }
            ShareOutcome::NotCapturing(descriptor) => descriptor,
            ShareOutcome::Unknown => return Err(CaptureError::unknown_source(source_id)),
        };

        let shared = self.open(&descriptor, config).await?;
        match self.registry.attach(source_id, shared, config.clone()) {
            Ok(handle) => {
                tracing::info!(
                    source_id,
                    kind = ?descriptor.kind,
                    backend = self.backend.name(),
                    "Hardware capture started"
                );
                Ok(handle)
            }
            Err(orphan) => {
                orphan.stop_all();
                Err(CaptureError::unavailable(
                    source_id,
                    "source was removed while opening",
                ))
            }
        }
    }

    /// Give up one reference to `source_id`.
    ///
    /// The hardware is stopped when the count reaches zero. Releasing a
    /// source with no references is a no-op.
    pub fn release(&self, source_id: &str) {
        match self.registry.decrement(source_id) {
            Some(shared) => shared.stop_all(),
            None => tracing::trace!(
                source_id,
                reference_count = self.registry.reference_count(source_id),
                "Reference released"
            ),
        }
    }

    /// Stop a consumer handle and release its reference.
    pub fn release_handle(&self, mut handle: StreamHandle) {
        handle.stop();
        self.release(handle.source_id());
    }

    /// Like [`capture`](Self::capture), but the reference is returned when
    /// the lease is dropped.
    pub async fn lease(
        self: &Arc<Self>,
        source_id: &str,
        config: &CaptureConfig,
    ) -> Result<StreamLease, CaptureError> {
        let handle = self.capture(source_id, config).await?;
        Ok(StreamLease {
            handle: Some(handle),
            manager: Arc::clone(self),
        })
    }

    /// Re-discover sources from the backend (cameras) and the host
    /// (windows, displays). Sources in use are kept even if no longer listed.
    ///
    /// Returns the number of sources now known.
    pub async fn refresh_sources(&self, host: &dyn HostCapabilities) -> DirectorResult<usize> {
        let mut discovered = Vec::new();

        for camera in self.backend.enumerate_cameras().await? {
            let mut descriptor =
                SourceDescriptor::new(camera.device_id.clone(), MediaSourceKind::Camera, camera.name);
            descriptor.capture_id = camera.device_id;
            discovered.push(descriptor);
        }
        for window in host.list_capturable_windows().await? {
            discovered.push(SourceDescriptor::new(
                window.id,
                MediaSourceKind::Window,
                window.name,
            ));
        }
        for display in host.list_capturable_displays().await? {
            let mut descriptor =
                SourceDescriptor::new(display.id, MediaSourceKind::Screen, display.name);
            descriptor.width = Some(display.width);
            descriptor.height = Some(display.height);
            discovered.push(descriptor);
        }

        let removed = self.registry.sync(discovered);
        if !removed.is_empty() {
            tracing::info!(?removed, "Capture sources disappeared");
        }
        Ok(self.registry.list().len())
    }

    async fn open(
        &self,
        descriptor: &SourceDescriptor,
        config: &CaptureConfig,
    ) -> Result<Arc<SharedCapture>, CaptureError> {
        let constraints =
            CaptureConstraints::for_source(descriptor.kind, &descriptor.capture_id, config);
        let mut request = CaptureRequest {
            source_id: descriptor.id.clone(),
            constraints,
        };

        let feed = match self.backend.open(&request).await {
            Ok(feed) => feed,
            Err(CaptureError::Overconstrained { constraint, .. }) => {
                let Some(relaxed) = request.constraints.without_aspect() else {
                    return Err(CaptureError::Overconstrained {
                        source_id: descriptor.id.clone(),
                        constraint,
                    });
                };
                tracing::debug!(
                    source_id = %descriptor.id,
                    %constraint,
                    "Ideal aspect rejected, using device-native aspect"
                );
                request.constraints = relaxed;
                self.backend.open(&request).await?
            }
            Err(e) => return Err(e),
        };

        Ok(SharedCapture::new(descriptor.id.clone(), feed))
    }
}

/// An acquired [`StreamHandle`] that releases its reference on drop.
pub struct StreamLease {
    handle: Option<StreamHandle>,
    manager: Arc<MediaSourceManager>,
}

impl StreamLease {
    pub fn source_id(&self) -> &str {
        self.handle.as_ref().map_or("", StreamHandle::source_id)
    }

    pub fn handle(&self) -> Option<&StreamHandle> {
        self.handle.as_ref()
    }

    pub fn handle_mut(&mut self) -> Option<&mut StreamHandle> {
        self.handle.as_mut()
    }
}

impl fmt::Debug for StreamLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamLease")
            .field("handle", &self.handle)
            .finish()
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.manager.release_handle(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticBackend;

    fn manager() -> (Arc<SyntheticBackend>, MediaSourceManager) {
        let backend = Arc::new(SyntheticBackend::new().with_camera("cam1", "Camera 1"));
        let registry = Arc::new(MediaSourceRegistry::new());
        registry.register(SourceDescriptor::new(
            "cam1",
            MediaSourceKind::Camera,
            "Camera 1",
        ));
        (backend.clone(), MediaSourceManager::new(registry, backend))
    }

    #[tokio::test]
    async fn test_second_capture_shares_hardware() {
        let (backend, manager) = manager();
        let config = CaptureConfig::default();

        let a = manager.capture("cam1", &config).await.unwrap();
        let b = manager.capture("cam1", &config).await.unwrap();

        assert_eq!(backend.open_count("cam1"), 1);
        assert_eq!(manager.registry().reference_count("cam1"), 2);
        assert!(a.shares_capture_with(&b));
        assert_ne!(a.id(), b.id());

        manager.release_handle(a);
        assert_eq!(backend.live_feed_count("cam1"), 1);
        manager.release_handle(b);
        assert_eq!(backend.live_feed_count("cam1"), 0);
        assert!(!manager.registry().is_capturing("cam1"));
    }

    #[tokio::test]
    async fn test_unknown_source_is_typed_error() {
        let (_backend, manager) = manager();
        let err = manager
            .capture("nope", &CaptureConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, CaptureError::unknown_source("nope"));
    }

    #[tokio::test]
    async fn test_failure_is_not_retried_and_leaves_no_reference() {
        let (backend, manager) = manager();
        backend.fail_with(
            "cam1",
            CaptureError::PermissionDenied {
                source_id: "cam1".to_string(),
            },
        );

        let err = manager
            .capture("cam1", &CaptureConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied { .. }));
        assert_eq!(backend.open_attempts("cam1"), 1);
        assert_eq!(manager.registry().reference_count("cam1"), 0);
    }

    #[tokio::test]
    async fn test_overconstrained_camera_falls_back_to_native_aspect() {
        let backend = Arc::new(
            SyntheticBackend::new().with_strict_camera("cam43", "Old camera", (640, 480)),
        );
        let registry = Arc::new(MediaSourceRegistry::new());
        registry.register(SourceDescriptor::new(
            "cam43",
            MediaSourceKind::Camera,
            "Old camera",
        ));
        let manager = MediaSourceManager::new(registry, backend.clone());

        let handle = manager
            .capture("cam43", &CaptureConfig::default())
            .await
            .unwrap();
        assert_eq!(handle.dimensions(), Some((640, 480)));
        assert_eq!(backend.open_attempts("cam43"), 2);
        assert_eq!(backend.open_count("cam43"), 1);
    }

    #[tokio::test]
    async fn test_dropping_a_lease_releases_it() {
        let (backend, manager) = manager();
        let manager = Arc::new(manager);
        let config = CaptureConfig::default();

        let first = manager.lease("cam1", &config).await.unwrap();
        let second = manager.lease("cam1", &config).await.unwrap();
        assert_eq!(first.source_id(), "cam1");
        assert_eq!(manager.registry().reference_count("cam1"), 2);

        drop(first);
        assert_eq!(manager.registry().reference_count("cam1"), 1);
        assert_eq!(backend.live_feed_count("cam1"), 1);
        drop(second);
        assert_eq!(backend.live_feed_count("cam1"), 0);
    }

    #[tokio::test]
    async fn test_release_below_zero_is_noop() {
        let (backend, manager) = manager();
        manager.release("cam1");
        manager.release("cam1");
        assert_eq!(manager.registry().reference_count("cam1"), 0);

        let handle = manager
            .capture("cam1", &CaptureConfig::default())
            .await
            .unwrap();
        assert_eq!(manager.registry().reference_count("cam1"), 1);
        assert_eq!(backend.open_count("cam1"), 1);
        manager.release_handle(handle);
    }
}
