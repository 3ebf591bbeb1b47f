//! Plans: defaults inherited by every layout that does not set its own.

use serde::{Deserialize, Serialize};

/// Plan-level defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Background image URL.
    #[serde(default)]
    pub background_url: Option<String>,

    /// Foreground image URL.
    #[serde(default)]
    pub foreground_url: Option<String>,

    /// Image drawn under label text elements.
    #[serde(default)]
    pub label_background_url: Option<String>,

    /// Text color (`#RRGGBB` or `#RRGGBBAA`).
    #[serde(default)]
    pub text_color: Option<String>,

    /// Label display names.
    #[serde(default)]
    pub labels: LabelNames,
}

/// Display names for label elements. `None` means "inherit".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LabelNames {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub guest: Option<String>,
}

impl LabelNames {
    /// Fill every unset name from `fallback`.
    pub fn or(&self, fallback: &LabelNames) -> LabelNames {
        LabelNames {
            host: self.host.clone().or_else(|| fallback.host.clone()),
            subject: self.subject.clone().or_else(|| fallback.subject.clone()),
            guest: self.guest.clone().or_else(|| fallback.guest.clone()),
        }
    }
}

impl Plan {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}
