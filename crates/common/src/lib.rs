//! Director Common Utilities
//!
//! Shared infrastructure for all Director crates:
//! - Error taxonomy (capture, asset, missing data) and result aliases
//! - Frame pacing for display-refresh driven loops
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;

/// Canonical program width in pixels. Every composition renders at this size.
pub const PROGRAM_WIDTH: u32 = 1920;

/// Canonical program height in pixels.
pub const PROGRAM_HEIGHT: u32 = 1080;
