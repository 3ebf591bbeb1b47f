//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global director configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// Default capture constraints.
    pub capture: CaptureDefaults,

    /// Text overlay defaults.
    pub text: TextDefaults,

    /// Compositor defaults.
    pub compositor: CompositorDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Constraints applied when opening a capture device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Ideal camera width.
    pub ideal_width: u32,

    /// Ideal camera height.
    pub ideal_height: u32,

    /// Ideal camera aspect ratio (width / height).
    pub ideal_aspect: f64,

    /// Requested frame rate, if any.
    pub frame_rate: Option<u32>,
}

/// Text overlay defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextDefaults {
    /// Location of the overlay typeface (path or `file://` URL).
    pub overlay_font: Option<String>,

    /// How many times the overlay font is requested before falling back.
    pub font_load_attempts: u32,

    /// Per-attempt timeout in milliseconds.
    pub font_load_timeout_ms: u64,

    /// System fonts tried, in order, when the overlay font is unusable.
    pub fallback_font_paths: Vec<PathBuf>,

    /// Label shown for host label elements when nothing overrides it.
    pub host_label: String,

    /// Label shown for subject label elements when nothing overrides it.
    pub subject_label: String,

    /// Label shown for guest label elements when nothing overrides it.
    pub guest_label: String,

    /// Text color used when neither element nor plan set one.
    pub default_text_color: String,

    /// Rendered text layers kept before the least recently used is dropped.
    pub cache_capacity: usize,
}

/// Compositor defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorDefaults {
    /// Display refresh rate used when the host provides no refresh signal.
    pub refresh_rate_hz: u32,

    /// Color painted where no background image is available.
    pub fallback_color: String,

    /// Color painted when a composition cannot be loaded at all.
    pub error_color: String,

    /// Timeout for fetching static images, in milliseconds.
    pub asset_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "director=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            ideal_width: 1920,
            ideal_height: 1080,
            ideal_aspect: 16.0 / 9.0,
            frame_rate: None,
        }
    }
}

impl Default for TextDefaults {
    fn default() -> Self {
        Self {
            overlay_font: None,
            font_load_attempts: 3,
            font_load_timeout_ms: 3000,
            fallback_font_paths: default_system_fonts(),
            host_label: "Host".to_string(),
            subject_label: "Subject".to_string(),
            guest_label: "Guest".to_string(),
            default_text_color: "#FFFFFF".to_string(),
            cache_capacity: 16,
        }
    }
}

impl Default for CompositorDefaults {
    fn default() -> Self {
        Self {
            refresh_rate_hz: 60,
            fallback_color: "#000000".to_string(),
            error_color: "#202020".to_string(),
            asset_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl DirectorConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("director").join("config.json")
}

/// Well-known system font locations across platforms.
fn default_system_fonts() -> Vec<PathBuf> {
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/noto/NotoSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/Library/Fonts/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
        "C:\\Windows\\Fonts\\msyh.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "compositor": { "refresh_rate_hz": 30 } }"#;
        let config: DirectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.compositor.refresh_rate_hz, 30);
        assert_eq!(config.compositor.fallback_color, "#000000");
        assert_eq!(config.text.font_load_attempts, 3);
        assert_eq!(config.text.cache_capacity, 16);
        assert_eq!(config.capture.ideal_width, 1920);
    }

    #[test]
    fn test_default_labels() {
        let text = TextDefaults::default();
        assert_eq!(text.host_label, "Host");
        assert_eq!(text.subject_label, "Subject");
        assert_eq!(text.guest_label, "Guest");
    }
}
