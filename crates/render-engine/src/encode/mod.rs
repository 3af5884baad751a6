//! Encoders behind the output sink.

pub mod ffmpeg;
pub mod raw;

use nebula_common::error::NebulaResult;

pub use ffmpeg::{codec_args, FfmpegEncoder};
pub use raw::{RawStreamHeader, RawVideoEncoder};

/// Turns a sequence of opaque RGBA frames into an encoded byte stream.
#[async_trait::async_trait]
pub trait FrameEncoder: Send {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Prepare for frames of `width x height` at `fps`.
    async fn begin(&mut self, width: u32, height: u32, fps: u32) -> NebulaResult<()>;

    /// Consume one frame. The encoder must not keep a reference to `rgba`.
    async fn encode(&mut self, rgba: &[u8]) -> NebulaResult<()>;

    /// Flush and return the finished stream.
    async fn finish(&mut self) -> NebulaResult<Vec<u8>>;

    /// Drop everything written so far.
    async fn abort(&mut self);
}
