//! Error types shared across Director crates.
//!
//! Three failure families matter to the compositing core and each degrades
//! differently: a [`CaptureError`] blanks one video tile, an
//! [`AssetLoadError`] drops one static image or falls back to a system font,
//! and a [`DataNotFoundError`] fails the whole assignment.

/// Failure to open or keep a capture device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Capture source unavailable: {source_id}: {message}")]
    Unavailable { source_id: String, message: String },

    #[error("Permission denied for capture source {source_id}")]
    PermissionDenied { source_id: String },

    #[error("Capture device removed: {source_id}")]
    DeviceRemoved { source_id: String },

    #[error("Unknown capture source: {source_id}")]
    UnknownSource { source_id: String },

    #[error("Capture constraints cannot be satisfied for {source_id}: {constraint}")]
    Overconstrained {
        source_id: String,
        constraint: String,
    },
}

impl CaptureError {
    pub fn unavailable(source_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Unavailable {
            source_id: source_id.into(),
            message: msg.into(),
        }
    }

    pub fn unknown_source(source_id: impl Into<String>) -> Self {
        Self::UnknownSource {
            source_id: source_id.into(),
        }
    }

    /// Source id the error refers to.
    pub fn source_id(&self) -> &str {
        match self {
            Self::Unavailable { source_id, .. }
            | Self::PermissionDenied { source_id }
            | Self::DeviceRemoved { source_id }
            | Self::UnknownSource { source_id }
            | Self::Overconstrained { source_id, .. } => source_id,
        }
    }
}

/// Failure to fetch or decode an image or font.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetLoadError {
    #[error("Failed to fetch asset {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Failed to decode asset {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Timed out loading asset {url} after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("No usable font: {message}")]
    Font { message: String },
}

impl AssetLoadError {
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: msg.into(),
        }
    }

    pub fn decode(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: msg.into(),
        }
    }
}

/// A referenced schedule, layout, or plan does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataNotFoundError {
    #[error("Schedule not found: {0}")]
    Schedule(String),

    #[error("Layout not found: {0}")]
    Layout(String),

    #[error("Plan not found: {0}")]
    Plan(String),
}

/// Top-level error type for Director operations.
#[derive(Debug, thiserror::Error)]
pub enum DirectorError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),

    #[error(transparent)]
    DataNotFound(#[from] DataNotFoundError),

    #[error("Invalid layout: {message}")]
    InvalidLayout { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DirectorError.
pub type DirectorResult<T> = Result<T, DirectorError>;

impl DirectorError {
    pub fn invalid_layout(msg: impl Into<String>) -> Self {
        Self::InvalidLayout {
            message: msg.into(),
        }
    }

    /// Whether this error means the requested composition data is missing.
    pub fn is_data_not_found(&self) -> bool {
        matches!(self, Self::DataNotFound(_))
    }
}
