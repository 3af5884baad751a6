//! The native effect processor contract.
//!
//! A processor owns an arena of pixel buffers addressed by raw pointers.
//! Nothing outside [`crate::exchange::BufferExchange`] should call the arena
//! methods directly: the processor does not validate pointers, and a
//! double free corrupts its allocator.

use nebula_common::error::NebulaResult;
use nebula_render_model::FrameMetrics;

/// Address of a buffer inside a processor arena.
pub type BufferPtr = u64;

/// Pixel operations over buffers living in the processor's arena.
///
/// Filter operations transform a buffer and return the pointer holding
/// the result, which is usually the input pointer. Transition operations
/// blend two buffers and return a freshly allocated result buffer that the
/// caller must free.
#[async_trait::async_trait]
pub trait NativeEffectProcessor: Send {
    /// Load the processor. Calling this again after success is a no-op.
    async fn init(&mut self) -> NebulaResult<()>;

    /// Whether `init` has completed successfully.
    fn is_ready(&self) -> bool;

    /// Frame dimensions every subsequent operation assumes.
    fn set_dimensions(&mut self, width: u32, height: u32);

    /// Reserve `len` bytes. `None` when the arena is exhausted.
    fn malloc(&mut self, len: usize) -> Option<BufferPtr>;

    /// Release a buffer obtained from `malloc` or returned by an operation.
    fn free(&mut self, ptr: BufferPtr);

    /// Copy `data` into the buffer at `ptr`.
    fn write(&mut self, ptr: BufferPtr, data: &[u8]) -> NebulaResult<()>;

    /// Copy `len` bytes out of the buffer at `ptr`.
    fn read(&self, ptr: BufferPtr, len: usize) -> NebulaResult<Vec<u8>>;

    fn chroma_key(
        &mut self,
        ptr: BufferPtr,
        key: [u8; 3],
        tolerance: f32,
        softness: f32,
        spill_suppression: f32,
    ) -> NebulaResult<BufferPtr>;

    fn color_grade(
        &mut self,
        ptr: BufferPtr,
        brightness: f32,
        contrast: f32,
        saturation: f32,
        hue: f32,
    ) -> NebulaResult<BufferPtr>;

    fn blur(&mut self, ptr: BufferPtr, radius: u32) -> NebulaResult<BufferPtr>;

    fn sharpen(&mut self, ptr: BufferPtr, amount: f32) -> NebulaResult<BufferPtr>;

    fn vignette(&mut self, ptr: BufferPtr, intensity: f32, radius: f32)
        -> NebulaResult<BufferPtr>;

    fn noise_reduction(&mut self, ptr: BufferPtr, strength: u32) -> NebulaResult<BufferPtr>;

    fn apply_lut(
        &mut self,
        ptr: BufferPtr,
        temperature: f32,
        warmth: f32,
        contrast: f32,
        saturation: f32,
        intensity: f32,
    ) -> NebulaResult<BufferPtr>;

    fn fade(&mut self, from: BufferPtr, to: BufferPtr, progress: f32) -> NebulaResult<BufferPtr>;

    fn crossfade(&mut self, from: BufferPtr, to: BufferPtr, progress: f32)
        -> NebulaResult<BufferPtr>;

    fn wipe_left(&mut self, from: BufferPtr, to: BufferPtr, progress: f32)
        -> NebulaResult<BufferPtr>;

    fn wipe_right(&mut self, from: BufferPtr, to: BufferPtr, progress: f32)
        -> NebulaResult<BufferPtr>;

    fn wipe_up(&mut self, from: BufferPtr, to: BufferPtr, progress: f32)
        -> NebulaResult<BufferPtr>;

    fn wipe_down(&mut self, from: BufferPtr, to: BufferPtr, progress: f32)
        -> NebulaResult<BufferPtr>;

    fn slide_left(&mut self, from: BufferPtr, to: BufferPtr, progress: f32)
        -> NebulaResult<BufferPtr>;

    fn dissolve(&mut self, from: BufferPtr, to: BufferPtr, progress: f32)
        -> NebulaResult<BufferPtr>;

    fn fade_to_black(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr>;

    /// Compute summary statistics for a frame.
    fn analyze_frame(&self, pixels: &[u8]) -> NebulaResult<FrameMetrics>;

    /// Release processor-wide resources. The processor may be re-initialized.
    async fn shutdown(&mut self) -> NebulaResult<()> {
        Ok(())
    }
}
