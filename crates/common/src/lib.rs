//! Nebula Common Utilities
//!
//! Pieces every Nebula crate leans on: [`NebulaError`] and its result
//! alias, frame/time conversion through [`FrameClock`], the on-disk
//! [`AppConfig`], and `tracing` subscriber setup.

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
