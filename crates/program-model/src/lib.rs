//! Director Program Model
//!
//! Defines the data contracts the compositing core consumes:
//! - **Schedule:** the semantic content of one broadcast item (topic, people)
//! - **Plan:** inheritable defaults shared by every layout of a plan
//! - **Layout:** the ordered media and text elements that make up a frame
//! - **Store:** lookup of the above by id, backed by the data layer
//!
//! All element coordinates are in program pixels (1920x1080).

pub mod geometry;
pub mod layout;
pub mod plan;
pub mod schedule;
pub mod store;

pub use geometry::*;
pub use layout::*;
pub use plan::*;
pub use schedule::*;
pub use store::*;
