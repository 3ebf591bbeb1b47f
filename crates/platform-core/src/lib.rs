//! Director platform core contracts.
//!
//! The host process (desktop shell) provides two capabilities to the
//! compositing core: enumerating what can be captured, and reporting the
//! GPU. This crate defines those contracts without coupling to a concrete
//! host.

use director_common::error::DirectorResult;
use serde::{Deserialize, Serialize};

/// A top-level window that can be captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturableWindow {
    /// Opaque capture id understood by the host's desktop capture.
    pub id: String,
    /// Window title.
    pub name: String,
    /// Encoded thumbnail image, if the host produced one.
    #[serde(default)]
    pub thumbnail: Option<Vec<u8>>,
}

/// A display that can be captured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturableDisplay {
    /// Opaque capture id understood by the host's desktop capture.
    pub id: String,
    pub name: String,
    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
    #[serde(default)]
    pub thumbnail: Option<Vec<u8>>,
}

/// GPU identification reported by the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GpuInfo {
    pub vendor: String,
    pub model: String,
}

/// Hardware encoder family suggested by the GPU vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingHint {
    Nvenc,
    QuickSync,
    Amf,
    VideoToolbox,
    Software,
}

impl GpuInfo {
    /// Pick an encoder family from the vendor string.
    ///
    /// Not used by compositing itself; consumers that encode program output
    /// use it as a default.
    pub fn encoding_hint(&self) -> EncodingHint {
        let vendor = self.vendor.to_ascii_lowercase();
        if vendor.contains("nvidia") || vendor == "0x10de" {
            EncodingHint::Nvenc
        } else if vendor.contains("intel") || vendor == "0x8086" {
            EncodingHint::QuickSync
        } else if vendor.contains("amd") || vendor.starts_with("ati") || vendor == "0x1002" {
            EncodingHint::Amf
        } else if vendor.contains("apple") {
            EncodingHint::VideoToolbox
        } else {
            EncodingHint::Software
        }
    }
}

/// Capabilities the host process exposes to the core.
#[async_trait::async_trait]
pub trait HostCapabilities: Send + Sync {
    /// Windows currently available for capture.
    async fn list_capturable_windows(&self) -> DirectorResult<Vec<CapturableWindow>>;

    /// Displays currently available for capture.
    async fn list_capturable_displays(&self) -> DirectorResult<Vec<CapturableDisplay>>;

    /// GPU vendor and model.
    async fn report_gpu_vendor(&self) -> DirectorResult<GpuInfo>;
}

/// A host with a fixed inventory, for tests and headless tools.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub windows: Vec<CapturableWindow>,
    pub displays: Vec<CapturableDisplay>,
    pub gpu: GpuInfo,
}

impl StaticHost {
    /// A host with one primary 1920x1080 display and no windows.
    pub fn single_display() -> Self {
        Self {
            windows: Vec::new(),
            displays: vec![CapturableDisplay {
                id: "screen:0:0".to_string(),
                name: "Primary display".to_string(),
                width: 1920,
                height: 1080,
                is_primary: true,
                thumbnail: None,
            }],
            gpu: GpuInfo {
                vendor: "unknown".to_string(),
                model: "software".to_string(),
            },
        }
    }
}

#[async_trait::async_trait]
impl HostCapabilities for StaticHost {
    async fn list_capturable_windows(&self) -> DirectorResult<Vec<CapturableWindow>> {
        Ok(self.windows.clone())
    }

    async fn list_capturable_displays(&self) -> DirectorResult<Vec<CapturableDisplay>> {
        tracing::debug!(count = self.displays.len(), "Listing static displays");
        Ok(self.displays.clone())
    }

    async fn report_gpu_vendor(&self) -> DirectorResult<GpuInfo> {
        Ok(self.gpu.clone())
    }
}

/// The primary display, or the first one when none is flagged primary.
pub fn primary_display(displays: &[CapturableDisplay]) -> Option<&CapturableDisplay> {
    displays
        .iter()
        .find(|d| d.is_primary)
        .or_else(|| displays.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(vendor: &str) -> GpuInfo {
        GpuInfo {
            vendor: vendor.to_string(),
            model: String::new(),
        }
    }

    #[test]
    fn test_encoding_hint_from_vendor() {
        assert_eq!(gpu("NVIDIA Corporation").encoding_hint(), EncodingHint::Nvenc);
        assert_eq!(gpu("0x8086").encoding_hint(), EncodingHint::QuickSync);
        assert_eq!(gpu("AMD").encoding_hint(), EncodingHint::Amf);
        assert_eq!(gpu("Apple").encoding_hint(), EncodingHint::VideoToolbox);
        assert_eq!(gpu("llvmpipe").encoding_hint(), EncodingHint::Software);
    }

    #[test]
    fn test_primary_display_falls_back_to_first() {
        let mut host = StaticHost::single_display();
        host.displays[0].is_primary = false;
        host.displays.push(CapturableDisplay {
            id: "screen:1:0".to_string(),
            name: "Side".to_string(),
            width: 1280,
            height: 1024,
            is_primary: false,
            thumbnail: None,
        });
        assert_eq!(primary_display(&host.displays).unwrap().id, "screen:0:0");

        host.displays[1].is_primary = true;
        assert_eq!(primary_display(&host.displays).unwrap().id, "screen:1:0");
    }

    #[tokio::test]
    async fn test_static_host_lists_inventory() {
        let host = StaticHost::single_display();
        let displays = host.list_capturable_displays().await.unwrap();
        assert_eq!(displays.len(), 1);
        assert!(host.list_capturable_windows().await.unwrap().is_empty());
    }
}
