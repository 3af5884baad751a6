//! Nebula Render Engine
//!
//! Offline rendering pipeline that samples one or two media sources,
//! runs each frame through the native effect processor, and streams the
//! result into an encoder.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source 0 ──┐
//!            ├── Seek Coordinator (concurrent seeks, bounded by timeout)
//! source 1 ──┘          │
//!                       ├── Transition blend (blended phases)
//!                       │
//!                       ├── Filter chain ──── Buffer Exchange ──── Native processor
//!                       │
//!                       ├── Watermark + flatten
//!                       ▼
//!                  Output Sink ── Encoder (ffmpeg / raw)
//!                       │
//!                       ▼
//!                 OutputArtifact
//! ```
//!
//! [`scheduler::FrameScheduler`] drives the whole loop.

pub mod compositor;
pub mod encode;
pub mod export;
pub mod scheduler;
pub mod seek;
pub mod sink;
pub mod source;

pub use export::*;
pub use scheduler::{
    CancelHandle, FrameScheduler, ProgressCallback, RenderProgress, RenderStage, RenderState,
    RenderStats, SchedulerConfig,
};
