//! Nebula Render Model
//!
//! Defines the core data contracts for Nebula renders:
//! - **Frames:** Raw RGBA pixel data and canvas sizing
//! - **Effects:** Closed enumerations of filter and transition operations
//! - **Plans:** Phase-by-phase descriptions of which source time ranges
//!   feed which output frames
//! - **Requests:** Encoding descriptors, watermark overlays, and the
//!   finalized output artifact
//!
//! All timestamps are in seconds. Output time always starts at zero and
//! advances by exactly one frame interval per output frame.

pub mod effect;
pub mod frame;
pub mod plan;
pub mod request;
pub mod watermark;

pub use effect::*;
pub use frame::*;
pub use plan::*;
pub use request::*;
pub use watermark::*;
