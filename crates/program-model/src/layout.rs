//! Layouts and their elements.
//!
//! A layout is an ordered set of media and text elements positioned in
//! program pixels. Element `z_index` orders painting within a layer
//! category only; categories always paint background, video, text,
//! foreground regardless of z.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::plan::{LabelNames, Plan};

/// Top-level layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    /// Unique layout identifier.
    pub id: String,

    /// Owning plan, if any.
    #[serde(default)]
    pub plan_id: Option<String>,

    #[serde(default)]
    pub name: String,

    /// Background image URL. Inherits from the plan when absent.
    #[serde(default)]
    pub background_url: Option<String>,

    /// Foreground image URL. Inherits from the plan when absent.
    #[serde(default)]
    pub foreground_url: Option<String>,

    /// Image drawn under label text. Inherits from the plan when absent.
    #[serde(default)]
    pub label_background_url: Option<String>,

    /// Default text color. Inherits from the plan when absent.
    #[serde(default)]
    pub text_color: Option<String>,

    /// Label name overrides.
    #[serde(default)]
    pub labels: LabelNames,

    /// Elements in authoring order.
    #[serde(default)]
    pub elements: Vec<LayoutElement>,
}

/// One element of a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayoutElement {
    Media(MediaElement),
    Text(TextElement),
}

/// A video tile fed by a capture source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaElement {
    pub id: String,

    #[serde(flatten)]
    pub rect: Rect,

    #[serde(default)]
    pub z_index: i32,

    /// Capture source shown in this tile. `None` leaves the tile empty.
    #[serde(default)]
    pub source_id: Option<String>,

    #[serde(default)]
    pub fit_mode: FitMode,

    /// Skip the opaque black fill behind the video.
    #[serde(default)]
    pub transparent_background: bool,
}

/// A text overlay resolved from the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub id: String,

    #[serde(flatten)]
    pub rect: Rect,

    #[serde(default)]
    pub z_index: i32,

    #[serde(default)]
    pub font_style: FontStyle,

    #[serde(default)]
    pub orientation: Orientation,

    pub kind: TextKind,
}

/// How a source frame maps onto a rectangle of a different aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Crop to cover the whole rectangle.
    #[default]
    Fill,
    /// Letterbox; no cropping.
    Fit,
    /// Ignore aspect ratio.
    Stretch,
    /// Native size when it fits, otherwise behave like `Fill`.
    Center,
}

/// Text flow direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

/// What a text element displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextKind {
    HostLabel,
    HostInfo,
    SubjectLabel,
    SubjectInfo,
    GuestLabel,
    GuestInfo,
}

impl TextKind {
    /// Label kinds show a fixed caption; info kinds show schedule content.
    pub fn is_label(self) -> bool {
        matches!(
            self,
            TextKind::HostLabel | TextKind::SubjectLabel | TextKind::GuestLabel
        )
    }

    /// Stable name used in fingerprints and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            TextKind::HostLabel => "host-label",
            TextKind::HostInfo => "host-info",
            TextKind::SubjectLabel => "subject-label",
            TextKind::SubjectInfo => "subject-info",
            TextKind::GuestLabel => "guest-label",
            TextKind::GuestInfo => "guest-info",
        }
    }
}

/// Font settings of a text element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontStyle {
    /// Pixel height of a line.
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// CSS-style weight, 100..=900.
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,

    /// Text color; inherits layout/plan color when absent.
    #[serde(default)]
    pub font_color: Option<String>,

    #[serde(default)]
    pub align: TextAlign,
}

fn default_font_size() -> f32 {
    36.0
}

fn default_font_weight() -> u16 {
    400
}

impl Default for FontStyle {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            font_weight: default_font_weight(),
            font_color: None,
            align: TextAlign::default(),
        }
    }
}

impl FontStyle {
    /// Weights from semibold upward render bold.
    pub fn is_bold(&self) -> bool {
        self.font_weight >= 600
    }
}

/// Alignment of text inside its element rectangle (main axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Start,
    Center,
    End,
}

impl LayoutElement {
    pub fn id(&self) -> &str {
        match self {
            LayoutElement::Media(m) => &m.id,
            LayoutElement::Text(t) => &t.id,
        }
    }

    pub fn z_index(&self) -> i32 {
        match self {
            LayoutElement::Media(m) => m.z_index,
            LayoutElement::Text(t) => t.z_index,
        }
    }

    pub fn rect(&self) -> Rect {
        match self {
            LayoutElement::Media(m) => m.rect,
            LayoutElement::Text(t) => t.rect,
        }
    }
}

impl Layout {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plan_id: None,
            name: String::new(),
            background_url: None,
            foreground_url: None,
            label_background_url: None,
            text_color: None,
            labels: LabelNames::default(),
            elements: Vec::new(),
        }
    }

    /// Reject layouts whose element ids are not unique.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.id()) {
                return Err(format!(
                    "layout {} has duplicate element id {}",
                    self.id,
                    element.id()
                ));
            }
        }
        Ok(())
    }

    /// Media elements in layout order.
    pub fn media_elements(&self) -> impl Iterator<Item = &MediaElement> {
        self.elements.iter().filter_map(|e| match e {
            LayoutElement::Media(m) => Some(m),
            LayoutElement::Text(_) => None,
        })
    }

    /// Text elements sorted by ascending z-index (stable for equal z).
    pub fn text_elements_by_z(&self) -> Vec<&TextElement> {
        let mut texts: Vec<&TextElement> = self
            .elements
            .iter()
            .filter_map(|e| match e {
                LayoutElement::Text(t) => Some(t),
                LayoutElement::Media(_) => None,
            })
            .collect();
        texts.sort_by_key(|t| t.z_index);
        texts
    }

    pub fn effective_background_url(&self, plan: &Plan) -> Option<String> {
        self.background_url
            .clone()
            .or_else(|| plan.background_url.clone())
    }

    pub fn effective_foreground_url(&self, plan: &Plan) -> Option<String> {
        self.foreground_url
            .clone()
            .or_else(|| plan.foreground_url.clone())
    }

    pub fn effective_label_background_url(&self, plan: &Plan) -> Option<String> {
        self.label_background_url
            .clone()
            .or_else(|| plan.label_background_url.clone())
    }

    pub fn effective_text_color(&self, plan: &Plan) -> Option<String> {
        self.text_color.clone().or_else(|| plan.text_color.clone())
    }

    pub fn effective_labels(&self, plan: &Plan) -> LabelNames {
        self.labels.or(&plan.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: &str, z: i32) -> LayoutElement {
        LayoutElement::Text(TextElement {
            id: id.to_string(),
            rect: Rect::new(0.0, 0.0, 100.0, 40.0),
            z_index: z,
            font_style: FontStyle::default(),
            orientation: Orientation::Horizontal,
            kind: TextKind::HostInfo,
        })
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut layout = Layout::new("l1");
        layout.elements = vec![text("a", 0), text("a", 1)];
        assert!(layout.validate().is_err());

        layout.elements = vec![text("a", 0), text("b", 1)];
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_text_sorted_by_z() {
        let mut layout = Layout::new("l1");
        layout.elements = vec![text("top", 5), text("bottom", -1), text("mid", 2)];
        let ids: Vec<&str> = layout
            .text_elements_by_z()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids, vec!["bottom", "mid", "top"]);
    }

    #[test]
    fn test_inherits_plan_defaults() {
        let mut plan = Plan::new("p");
        plan.background_url = Some("plan-bg.png".to_string());
        plan.labels.host = Some("Moderator".to_string());

        let mut layout = Layout::new("l");
        assert_eq!(
            layout.effective_background_url(&plan).as_deref(),
            Some("plan-bg.png")
        );

        layout.background_url = Some("own-bg.png".to_string());
        assert_eq!(
            layout.effective_background_url(&plan).as_deref(),
            Some("own-bg.png")
        );
        assert_eq!(
            layout.effective_labels(&plan).host.as_deref(),
            Some("Moderator")
        );
    }

    #[test]
    fn test_element_json_shape() {
        let json = r#"{
            "type": "media", "id": "m1", "x": 0, "y": 0, "w": 960, "h": 540,
            "z_index": 2, "source_id": "cam1", "fit_mode": "fit"
        }"#;
        let element: LayoutElement = serde_json::from_str(json).unwrap();
        match element {
            LayoutElement::Media(m) => {
                assert_eq!(m.rect, Rect::new(0.0, 0.0, 960.0, 540.0));
                assert_eq!(m.fit_mode, FitMode::Fit);
                assert!(!m.transparent_background);
            }
            LayoutElement::Text(_) => panic!("expected media element"),
        }

        let json = r#"{"type": "text", "id": "t1", "x": 0, "y": 900, "w": 1920, "h": 80,
            "kind": "subject-info", "orientation": "vertical"}"#;
        let element: LayoutElement = serde_json::from_str(json).unwrap();
        assert_eq!(element.id(), "t1");
    }
}
