//! Director Render Engine
//!
//! Live compositing of capture feeds, static artwork and schedule-driven
//! text into the preview and live program canvases.
//!
//! # Frame Architecture
//!
//! ```text
//!  Plan / Layout ──► background.png ──┐
//!                                     │ (1) static, pre-scaled
//!  MediaSourceManager ──► leases ─────┤ (2) video, z ascending,
//!                                     │     fit via scaling math
//!  Schedule ──► TextLayerCache ───────┤ (3) text bitmap
//!                                     │
//!  Plan / Layout ──► foreground.png ──┤ (4) static, pre-scaled
//!                                     ▼
//!                              Compositor canvas
//!                                     │
//!             ProgramSwitch: preview ◄┴► live (copy / swap)
//! ```
//!
//! Loading suspends on assets and capture; drawing a frame never does.
//! Anything not ready is skipped for that frame.

pub mod assets;
pub mod compositor;
pub mod font;
pub mod frame_loop;
pub mod scaling;
pub mod surface;
pub mod switch;
pub mod text;
pub mod text_cache;

pub use assets::{AssetLoader, FileAssetLoader, ImageCache, MemoryAssetLoader};
pub use compositor::*;
pub use font::FontProvider;
pub use frame_loop::*;
pub use scaling::*;
pub use surface::*;
pub use switch::*;
pub use text_cache::*;
