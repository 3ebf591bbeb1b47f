//! Director Media Sources
//!
//! Catalog of capture sources (cameras, windows, screens) and the
//! reference-counted protocol for sharing their live feeds between
//! compositors.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              MediaSourceManager               │
//! │   capture(id) ──► open once ──► clone         │
//! │   release(id) ──► count - 1 ──► stop at 0     │
//! │        │                          │           │
//! │        ▼                          ▼           │
//! │  ┌─────────────────────┐ ┌──────────────────┐ │
//! │  │ MediaSourceRegistry │ │  CaptureBackend  │ │
//! │  │ id → handle, count  │ │ camera / desktop │ │
//! │  └─────────────────────┘ └──────────────────┘ │
//! └───────────────────────────────────────────────┘
//!          │ StreamHandle clones
//!          ▼
//!   preview compositor      live compositor
//! ```
//!
//! Only the manager starts or stops hardware. Consumers hold
//! [`StreamHandle`] clones that they may play and stop independently.

pub mod backend;
pub mod manager;
pub mod registry;
pub mod stream;
pub mod synthetic;

pub use backend::*;
pub use manager::*;
pub use registry::*;
pub use stream::*;
