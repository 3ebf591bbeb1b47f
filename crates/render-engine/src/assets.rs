//! Static asset fetching and the decoded-image cache.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use director_common::error::AssetLoadError;
use image::{ImageFormat, RgbaImage};
use parking_lot::{Mutex, RwLock};

use crate::surface::Bitmap;

/// Fetches raw asset bytes by URL.
#[async_trait::async_trait]
pub trait AssetLoader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetLoadError>;
}

/// Loads `file://` URLs and plain paths from disk.
///
/// Relative paths resolve against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileAssetLoader {
    root: Option<PathBuf>,
}

impl FileAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, AssetLoadError> {
        if url.contains("://") && !url.starts_with("file://") {
            return Err(AssetLoadError::fetch(url, "unsupported URL scheme"));
        }
        let path = PathBuf::from(url.trim_start_matches("file://"));
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        })
    }
}

#[async_trait::async_trait]
impl AssetLoader for FileAssetLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetLoadError> {
        let path = self.resolve(url)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AssetLoadError::fetch(url, e.to_string()))
    }
}

/// In-memory assets keyed by URL.
#[derive(Debug, Default)]
pub struct MemoryAssetLoader {
    assets: RwLock<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.assets.write().insert(url.into(), bytes);
    }

    /// Store `image` encoded as PNG.
    pub fn insert_image(&self, url: impl Into<String>, image: &RgbaImage) -> Result<(), AssetLoadError> {
        let url = url.into();
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| AssetLoadError::decode(&url, e.to_string()))?;
        self.insert(url, bytes);
        Ok(())
    }

    /// Number of fetches served or refused so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AssetLoader for MemoryAssetLoader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetLoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.assets
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| AssetLoadError::fetch(url, "not found"))
    }
}

/// Decoded images cached by URL.
///
/// Entries are immutable once inserted; concurrent loads of the same URL
/// may both decode, and the first to finish wins.
pub struct ImageCache {
    loader: Arc<dyn AssetLoader>,
    timeout: Duration,
    entries: Mutex<HashMap<String, Bitmap>>,
}

impl ImageCache {
    pub fn new(loader: Arc<dyn AssetLoader>, timeout: Duration) -> Self {
        Self {
            loader,
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &Arc<dyn AssetLoader> {
        &self.loader
    }

    /// The decoded image at `url`, fetching it on first use.
    pub async fn get(&self, url: &str) -> Result<Bitmap, AssetLoadError> {
        if let Some(bitmap) = self.entries.lock().get(url) {
            return Ok(bitmap.clone());
        }

        let bytes = tokio::time::timeout(self.timeout, self.loader.fetch(url))
            .await
            .map_err(|_| AssetLoadError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            })??;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| AssetLoadError::decode(url, e.to_string()))?
            .to_rgba8();
        tracing::debug!(
            url,
            width = decoded.width(),
            height = decoded.height(),
            "Image decoded"
        );

        let mut entries = self.entries.lock();
        let bitmap = entries
            .entry(url.to_string())
            .or_insert_with(|| Bitmap::new(decoded))
            .clone();
        Ok(bitmap)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.lock().contains_key(url)
    }

    pub fn evict(&self, url: &str) -> bool {
        self.entries.lock().remove(url).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
