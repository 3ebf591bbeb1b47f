//! In-memory catalog of capture sources.
//!
//! Each entry owns at most one live capture (the original [`StreamHandle`])
//! plus a reference count of consumers holding clones of it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::backend::CaptureConfig;
use crate::stream::{SharedCapture, StreamHandle};

/// What kind of device feeds a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSourceKind {
    Camera,
    Window,
    Screen,
}

/// A discoverable source, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable id layouts refer to.
    pub id: String,
    pub kind: MediaSourceKind,
    pub name: String,
    /// Opaque id passed to the capture backend (device id or desktop capture id).
    pub capture_id: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, kind: MediaSourceKind, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            capture_id: id.clone(),
            id,
            kind,
            name: name.into(),
            width: None,
            height: None,
        }
    }
}

/// Snapshot of a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub id: String,
    pub kind: MediaSourceKind,
    pub name: String,
    pub capture_id: String,
    pub reference_count: u32,
    pub is_active: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

struct Entry {
    descriptor: SourceDescriptor,
    capture: Option<StreamHandle>,
    config: Option<CaptureConfig>,
    reference_count: u32,
}

impl Entry {
    fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            capture: None,
            config: None,
            reference_count: 0,
        }
    }

    fn snapshot(&self) -> MediaSource {
        let dims = self.capture.as_ref().and_then(StreamHandle::dimensions);
        MediaSource {
            id: self.descriptor.id.clone(),
            kind: self.descriptor.kind,
            name: self.descriptor.name.clone(),
            capture_id: self.descriptor.capture_id.clone(),
            reference_count: self.reference_count,
            is_active: self.capture.as_ref().is_some_and(StreamHandle::is_active),
            width: dims.map(|(w, _)| w).or(self.descriptor.width),
            height: dims.map(|(_, h)| h).or(self.descriptor.height),
        }
    }
}

/// Outcome of asking the registry to share an existing capture.
pub(crate) enum ShareOutcome {
    /// A clone of the live capture; the count was incremented.
    Shared {
        handle: StreamHandle,
        config_matches: bool,
    },
    /// The source exists but has no live capture.
    NotCapturing(SourceDescriptor),
    /// No such source.
    Unknown,
}

/// Registry of capture sources keyed by id.
#[derive(Default)]
pub struct MediaSourceRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MediaSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source or update its descriptor. A live capture is kept.
    pub fn register(&self, descriptor: SourceDescriptor) {
        let mut entries = self.entries.lock();
        match entries.get_mut(&descriptor.id) {
            Some(entry) => entry.descriptor = descriptor,
            None => {
                entries.insert(descriptor.id.clone(), Entry::new(descriptor));
            }
        }
    }

    /// Replace the catalog with `discovered`, keeping any source still in use.
    ///
    /// Returns the ids of sources removed.
    pub fn sync(&self, discovered: Vec<SourceDescriptor>) -> Vec<String> {
        let ids: HashSet<String> = discovered.iter().map(|d| d.id.clone()).collect();
        for descriptor in discovered {
            self.register(descriptor);
        }

        let mut entries = self.entries.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(id, entry)| !ids.contains(*id) && entry.reference_count == 0)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            entries.remove(id);
        }
        stale
    }

    pub fn get(&self, id: &str) -> Option<MediaSource> {
        self.entries.lock().get(id).map(Entry::snapshot)
    }

    /// All sources, sorted by id.
    pub fn list(&self) -> Vec<MediaSource> {
        let mut sources: Vec<MediaSource> =
            self.entries.lock().values().map(Entry::snapshot).collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        sources
    }

    /// Reference count of a source; zero for unknown ids.
    pub fn reference_count(&self, id: &str) -> u32 {
        self.entries
            .lock()
            .get(id)
            .map(|e| e.reference_count)
            .unwrap_or(0)
    }

    /// Whether a live capture is held for `id`.
    pub fn is_capturing(&self, id: &str) -> bool {
        self.entries
            .lock()
            .get(id)
            .is_some_and(|e| e.capture.is_some())
    }

    /// Sum of all reference counts.
    pub fn outstanding_references(&self) -> u32 {
        self.entries.lock().values().map(|e| e.reference_count).sum()
    }

    pub(crate) fn try_share(&self, id: &str, config: &CaptureConfig) -> ShareOutcome {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return ShareOutcome::Unknown;
        };
        match &entry.capture {
            Some(original) => {
                entry.reference_count += 1;
                ShareOutcome::Shared {
                    handle: original.clone(),
                    config_matches: entry.config.as_ref() == Some(config),
                }
            }
            None => ShareOutcome::NotCapturing(entry.descriptor.clone()),
        }
    }

    /// Store a freshly opened capture with a count of one.
    ///
    /// Fails (returning the capture) when the source vanished meanwhile
    /// or already holds a capture.
    pub(crate) fn attach(
        &self,
        id: &str,
        shared: Arc<SharedCapture>,
        config: CaptureConfig,
    ) -> Result<StreamHandle, Arc<SharedCapture>> {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return Err(shared);
        };
        if entry.capture.is_some() {
            return Err(shared);
        }
        let original = StreamHandle::new(shared);
        let consumer = original.clone();
        entry.capture = Some(original);
        entry.config = Some(config);
        entry.reference_count = 1;
        Ok(consumer)
    }

    /// Decrement the count of `id`.
    ///
    /// Returns the capture to stop when the count reached zero. Decrementing
    /// an idle or unknown source is a no-op.
    pub(crate) fn decrement(&self, id: &str) -> Option<Arc<SharedCapture>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(id)?;
        if entry.reference_count == 0 {
            tracing::debug!(source_id = %id, "Release of idle source ignored");
            return None;
        }
        entry.reference_count -= 1;
        if entry.reference_count > 0 {
            return None;
        }
        entry.config = None;
        entry.capture.take().map(|mut original| {
            original.stop();
            original.shared()
        })
    }
}
