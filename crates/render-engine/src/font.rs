//! Overlay typeface loading.

use std::sync::Arc;
use std::time::Duration;

use director_common::config::TextDefaults;
use director_common::error::AssetLoadError;
use rusttype::Font;
use tokio::sync::OnceCell;

use crate::assets::AssetLoader;

/// Loads the overlay font once and hands it to every text render.
///
/// The configured overlay font is tried a bounded number of times, each
/// attempt with a timeout. After that the first readable system font from
/// the fallback list is used. When nothing loads, text renders without
/// glyphs instead of blocking.
pub struct FontProvider {
    defaults: TextDefaults,
    loader: Arc<dyn AssetLoader>,
    font: OnceCell<Option<Font<'static>>>,
}

impl FontProvider {
    pub fn new(defaults: TextDefaults, loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            defaults,
            loader,
            font: OnceCell::new(),
        }
    }

    /// The loaded font, waiting for the first load to finish.
    pub async fn font(&self) -> Option<Font<'static>> {
        self.font
            .get_or_init(|| async { self.load().await })
            .await
            .clone()
    }

    /// Whether loading has finished, successfully or not.
    pub fn is_resolved(&self) -> bool {
        self.font.initialized()
    }

    async fn load(&self) -> Option<Font<'static>> {
        if let Some(url) = &self.defaults.overlay_font {
            match self.load_overlay(url).await {
                Ok(font) => {
                    tracing::info!(font = %url, "Overlay font loaded");
                    return Some(font);
                }
                Err(e) => tracing::warn!(
                    font = %url,
                    error = %e,
                    "Overlay font unavailable, falling back to system font"
                ),
            }
        }

        for path in &self.defaults.fallback_font_paths {
            let Ok(bytes) = tokio::fs::read(path).await else {
                continue;
            };
            if let Some(font) = Font::try_from_vec(bytes) {
                tracing::info!(path = %path.display(), "Using system font");
                return Some(font);
            }
            tracing::debug!(path = %path.display(), "System font did not parse");
        }

        tracing::warn!("No usable font found; text layers will render without glyphs");
        None
    }

    async fn load_overlay(&self, url: &str) -> Result<Font<'static>, AssetLoadError> {
        let attempts = self.defaults.font_load_attempts.max(1);
        let timeout = Duration::from_millis(self.defaults.font_load_timeout_ms);
        let mut last_error = AssetLoadError::Font {
            message: "no attempts made".to_string(),
        };

        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(timeout, self.loader.fetch(url)).await {
                Ok(Ok(bytes)) => Font::try_from_vec(bytes).ok_or_else(|| AssetLoadError::Font {
                    message: format!("{url} is not a TrueType/OpenType font"),
                }),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(AssetLoadError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.defaults.font_load_timeout_ms,
                }),
            };
            match result {
                Ok(font) => return Ok(font),
                // A file that is not a font will not become one on retry.
                Err(e @ AssetLoadError::Font { .. }) => return Err(e),
                Err(e) => {
                    tracing::debug!(font = %url, attempt, error = %e, "Font load attempt failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetLoader;

    fn defaults() -> TextDefaults {
        TextDefaults {
            overlay_font: Some("fonts/overlay.ttf".to_string()),
            font_load_attempts: 3,
            font_load_timeout_ms: 200,
            fallback_font_paths: Vec::new(),
            ..TextDefaults::default()
        }
    }

    #[tokio::test]
    async fn test_missing_font_is_retried_then_given_up() {
        let loader = Arc::new(MemoryAssetLoader::new());
        let provider = FontProvider::new(defaults(), loader.clone());

        assert!(provider.font().await.is_none());
        assert!(provider.is_resolved());
        assert_eq!(loader.fetch_count(), 3);

        // Resolved once per provider.
        assert!(provider.font().await.is_none());
        assert_eq!(loader.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_font_bytes_are_not_retried() {
        let loader = Arc::new(MemoryAssetLoader::new());
        loader.insert("fonts/overlay.ttf", b"definitely not a font".to_vec());
        let provider = FontProvider::new(defaults(), loader.clone());

        assert!(provider.font().await.is_none());
        assert_eq!(loader.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_no_overlay_font_skips_fetching() {
        let loader = Arc::new(MemoryAssetLoader::new());
        let provider = FontProvider::new(
            TextDefaults {
                overlay_font: None,
                fallback_font_paths: Vec::new(),
                ..TextDefaults::default()
            },
            loader.clone(),
        );
        assert!(provider.font().await.is_none());
        assert_eq!(loader.fetch_count(), 0);
    }
}
