//! Software reference processor.
//!
//! Implements the full processor contract on the CPU over a bounded
//! arena. Also records arena traffic so callers can verify that every
//! buffer was released exactly once.

mod filters;
mod transitions;

use std::collections::HashMap;

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::FrameMetrics;

use crate::processor::{BufferPtr, NativeEffectProcessor};

/// Arena addresses start here so a zero pointer is never valid.
const ARENA_BASE: BufferPtr = 0x1000;

/// Luma variance below which a frame counts as flat.
const FLAT_VARIANCE: f64 = 1.0;

/// CPU implementation of [`NativeEffectProcessor`].
pub struct CpuEffectProcessor {
    ready: bool,
    width: u32,
    height: u32,
    capacity: usize,
    used: usize,
    next_ptr: BufferPtr,
    arena: HashMap<BufferPtr, Vec<u8>>,
    mallocs: u64,
    frees: u64,
    invalid_frees: u64,
    operations: u64,
    fail_init: bool,
    fail_after: Option<u64>,
}

impl CpuEffectProcessor {
    /// A processor whose arena holds at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            ready: false,
            width: 0,
            height: 0,
            capacity,
            used: 0,
            next_ptr: ARENA_BASE,
            arena: HashMap::new(),
            mallocs: 0,
            frees: 0,
            invalid_frees: 0,
            operations: 0,
            fail_init: false,
            fail_after: None,
        }
    }

    /// Make `init` fail, as a processor whose module cannot load would.
    pub fn with_init_failure(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Let `n` pixel operations succeed, then fail every one after.
    pub fn fail_operations_after(mut self, n: u64) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Buffers currently reserved in the arena.
    pub fn live_allocations(&self) -> usize {
        self.arena.len()
    }

    pub fn malloc_count(&self) -> u64 {
        self.mallocs
    }

    pub fn free_count(&self) -> u64 {
        self.frees
    }

    /// Frees of pointers the arena did not know (double or wild frees).
    pub fn invalid_frees(&self) -> u64 {
        self.invalid_frees
    }

    /// Bytes currently reserved.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn begin_op(&mut self, name: &str) -> NebulaResult<()> {
        if !self.ready {
            return Err(NebulaError::processor(format!(
                "{name} called before init"
            )));
        }
        self.operations += 1;
        if let Some(limit) = self.fail_after {
            if self.operations > limit {
                return Err(NebulaError::processor(format!(
                    "{name} failed (operation {})",
                    self.operations
                )));
            }
        }
        Ok(())
    }

    fn frame_mut(&mut self, ptr: BufferPtr) -> NebulaResult<&mut Vec<u8>> {
        let expected = self.frame_len();
        let buf = self
            .arena
            .get_mut(&ptr)
            .ok_or_else(|| NebulaError::processor(format!("no buffer at {ptr:#x}")))?;
        if buf.len() < expected {
            return Err(NebulaError::processor(format!(
                "buffer at {ptr:#x} is {} bytes, frame needs {expected}",
                buf.len()
            )));
        }
        Ok(buf)
    }

    fn frame(&self, ptr: BufferPtr) -> NebulaResult<&[u8]> {
        let expected = self.frame_len();
        let buf = self
            .arena
            .get(&ptr)
            .ok_or_else(|| NebulaError::processor(format!("no buffer at {ptr:#x}")))?;
        if buf.len() < expected {
            return Err(NebulaError::processor(format!(
                "buffer at {ptr:#x} is {} bytes, frame needs {expected}",
                buf.len()
            )));
        }
        Ok(&buf[..expected])
    }

    fn filter_in_place(
        &mut self,
        name: &str,
        ptr: BufferPtr,
        f: impl FnOnce(&mut [u8], usize, usize),
    ) -> NebulaResult<BufferPtr> {
        self.begin_op(name)?;
        let (w, h) = (self.width as usize, self.height as usize);
        let len = self.frame_len();
        let buf = self.frame_mut(ptr)?;
        f(&mut buf[..len], w, h);
        Ok(ptr)
    }

    fn transition(
        &mut self,
        name: &str,
        from: BufferPtr,
        to: BufferPtr,
        f: impl FnOnce(&[u8], &[u8], usize, usize) -> Vec<u8>,
    ) -> NebulaResult<BufferPtr> {
        self.begin_op(name)?;
        let (w, h) = (self.width as usize, self.height as usize);
        let result = f(self.frame(from)?, self.frame(to)?, w, h);
        let out = self.malloc(result.len()).ok_or(NebulaError::ResourceExhausted {
            requested: result.len(),
        })?;
        self.write(out, &result)?;
        Ok(out)
    }
}

#[async_trait::async_trait]
impl NativeEffectProcessor for CpuEffectProcessor {
    async fn init(&mut self) -> NebulaResult<()> {
        if self.ready {
            return Ok(());
        }
        if self.fail_init {
            return Err(NebulaError::initialization(
                "software processor configured to fail",
            ));
        }
        self.ready = true;
        tracing::debug!(capacity = self.capacity, "CPU effect processor ready");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn malloc(&mut self, len: usize) -> Option<BufferPtr> {
        if len == 0 || self.used + len > self.capacity {
            return None;
        }
        let ptr = self.next_ptr;
        // keep addresses unique for the lifetime of the processor
        self.next_ptr += len.next_multiple_of(16) as BufferPtr;
        self.arena.insert(ptr, vec![0u8; len]);
        self.used += len;
        self.mallocs += 1;
        Some(ptr)
    }

    fn free(&mut self, ptr: BufferPtr) {
        match self.arena.remove(&ptr) {
            Some(buf) => {
                self.used -= buf.len();
                self.frees += 1;
            }
            None => {
                self.invalid_frees += 1;
                tracing::error!(ptr, "Free of unknown buffer");
            }
        }
    }

    fn write(&mut self, ptr: BufferPtr, data: &[u8]) -> NebulaResult<()> {
        let buf = self
            .arena
            .get_mut(&ptr)
            .ok_or_else(|| NebulaError::processor(format!("write to unknown buffer {ptr:#x}")))?;
        if data.len() > buf.len() {
            return Err(NebulaError::processor(format!(
                "write of {} bytes overflows {}-byte buffer",
                data.len(),
                buf.len()
            )));
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, ptr: BufferPtr, len: usize) -> NebulaResult<Vec<u8>> {
        let buf = self
            .arena
            .get(&ptr)
            .ok_or_else(|| NebulaError::processor(format!("read from unknown buffer {ptr:#x}")))?;
        buf.get(..len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| NebulaError::processor(format!("read of {len} bytes past buffer end")))
    }

    fn chroma_key(
        &mut self,
        ptr: BufferPtr,
        key: [u8; 3],
        tolerance: f32,
        softness: f32,
        spill_suppression: f32,
    ) -> NebulaResult<BufferPtr> {
        self.filter_in_place("chroma_key", ptr, |data, _, _| {
            filters::chroma_key(data, key, tolerance, softness, spill_suppression)
        })
    }

    fn color_grade(
        &mut self,
        ptr: BufferPtr,
        brightness: f32,
        contrast: f32,
        saturation: f32,
        hue: f32,
    ) -> NebulaResult<BufferPtr> {
        self.filter_in_place("color_grade", ptr, |data, _, _| {
            filters::color_grade(data, brightness, contrast, saturation, hue)
        })
    }

    fn blur(&mut self, ptr: BufferPtr, radius: u32) -> NebulaResult<BufferPtr> {
        self.filter_in_place("blur", ptr, |data, w, h| filters::blur(data, w, h, radius))
    }

    fn sharpen(&mut self, ptr: BufferPtr, amount: f32) -> NebulaResult<BufferPtr> {
        self.filter_in_place("sharpen", ptr, |data, w, h| {
            filters::sharpen(data, w, h, amount)
        })
    }

    fn vignette(
        &mut self,
        ptr: BufferPtr,
        intensity: f32,
        radius: f32,
    ) -> NebulaResult<BufferPtr> {
        self.filter_in_place("vignette", ptr, |data, w, h| {
            filters::vignette(data, w, h, intensity, radius)
        })
    }

    fn noise_reduction(&mut self, ptr: BufferPtr, strength: u32) -> NebulaResult<BufferPtr> {
        self.filter_in_place("noise_reduction", ptr, |data, w, h| {
            filters::noise_reduction(data, w, h, strength)
        })
    }

    fn apply_lut(
        &mut self,
        ptr: BufferPtr,
        temperature: f32,
        warmth: f32,
        contrast: f32,
        saturation: f32,
        intensity: f32,
    ) -> NebulaResult<BufferPtr> {
        self.filter_in_place("apply_lut", ptr, |data, _, _| {
            filters::apply_lut(data, temperature, warmth, contrast, saturation, intensity)
        })
    }

    fn fade(&mut self, from: BufferPtr, to: BufferPtr, progress: f32) -> NebulaResult<BufferPtr> {
        self.transition("fade", from, to, |a, b, _, _| transitions::fade(a, b, progress))
    }

    fn crossfade(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("crossfade", from, to, |a, b, _, _| {
            transitions::crossfade(a, b, progress)
        })
    }

    fn wipe_left(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("wipe_left", from, to, |a, b, w, h| {
            transitions::wipe_left(a, b, w, h, progress)
        })
    }

    fn wipe_right(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("wipe_right", from, to, |a, b, w, h| {
            transitions::wipe_right(a, b, w, h, progress)
        })
    }

    fn wipe_up(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("wipe_up", from, to, |a, b, w, h| {
            transitions::wipe_up(a, b, w, h, progress)
        })
    }

    fn wipe_down(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("wipe_down", from, to, |a, b, w, h| {
            transitions::wipe_down(a, b, w, h, progress)
        })
    }

    fn slide_left(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("slide_left", from, to, |a, b, w, h| {
            transitions::slide_left(a, b, w, h, progress)
        })
    }

    fn dissolve(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("dissolve", from, to, |a, b, w, h| {
            transitions::dissolve(a, b, w, h, progress)
        })
    }

    fn fade_to_black(
        &mut self,
        from: BufferPtr,
        to: BufferPtr,
        progress: f32,
    ) -> NebulaResult<BufferPtr> {
        self.transition("fade_to_black", from, to, |a, b, _, _| {
            transitions::fade_to_black(a, b, progress)
        })
    }

    fn analyze_frame(&self, pixels: &[u8]) -> NebulaResult<FrameMetrics> {
        if !self.ready {
            return Err(NebulaError::processor("analyze_frame called before init"));
        }
        let count = pixels.len() / 4;
        if count == 0 {
            return Err(NebulaError::processor("cannot analyze an empty frame"));
        }

        let mut luma_sum = 0.0f64;
        let mut luma_sq_sum = 0.0f64;
        let mut alpha_sum = 0.0f64;
        for px in pixels.chunks_exact(4) {
            let luma = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
            luma_sum += luma;
            luma_sq_sum += luma * luma;
            alpha_sum += px[3] as f64;
        }

        let n = count as f64;
        let mean_luma = luma_sum / n;
        let luma_variance = (luma_sq_sum / n - mean_luma * mean_luma).max(0.0);
        Ok(FrameMetrics {
            mean_luma,
            luma_variance,
            mean_alpha: alpha_sum / n,
            is_flat: luma_variance < FLAT_VARIANCE,
        })
    }

    async fn shutdown(&mut self) -> NebulaResult<()> {
        if !self.arena.is_empty() {
            tracing::warn!(
                live = self.arena.len(),
                "CPU effect processor shut down with live buffers"
            );
        }
        self.ready = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let mut cpu = CpuEffectProcessor::new(64);
        assert!(!cpu.is_ready());
        cpu.init().await.unwrap();
        cpu.init().await.unwrap();
        assert!(cpu.is_ready());
    }

    #[tokio::test]
    async fn test_init_failure() {
        let mut cpu = CpuEffectProcessor::new(64).with_init_failure();
        let err = cpu.init().await.unwrap_err();
        assert!(matches!(err, NebulaError::Initialization { .. }));
        assert!(!cpu.is_ready());
    }

    #[test]
    fn test_arena_accounting() {
        let mut cpu = CpuEffectProcessor::new(32);
        let a = cpu.malloc(16).unwrap();
        let b = cpu.malloc(16).unwrap();
        assert_ne!(a, b);
        assert!(cpu.malloc(1).is_none());
        cpu.free(a);
        cpu.free(a);
        assert_eq!(cpu.invalid_frees(), 1);
        assert_eq!(cpu.used_bytes(), 16);
        cpu.free(b);
        assert_eq!(cpu.live_allocations(), 0);
        assert_eq!(cpu.malloc_count(), cpu.free_count());
    }

    #[tokio::test]
    async fn test_transition_allocates_result() {
        let mut cpu = CpuEffectProcessor::new(1024);
        cpu.init().await.unwrap();
        cpu.set_dimensions(2, 2);
        let a = cpu.malloc(16).unwrap();
        let b = cpu.malloc(16).unwrap();
        cpu.write(b, &[200; 16]).unwrap();

        let out = cpu.crossfade(a, b, 1.0).unwrap();
        assert_ne!(out, a);
        assert_ne!(out, b);
        assert_eq!(cpu.read(out, 4).unwrap(), vec![200, 200, 200, 255]);
        assert_eq!(cpu.live_allocations(), 3);
    }

    #[tokio::test]
    async fn test_operations_fail_after_limit() {
        let mut cpu = CpuEffectProcessor::new(1024).fail_operations_after(1);
        cpu.init().await.unwrap();
        cpu.set_dimensions(2, 2);
        let a = cpu.malloc(16).unwrap();
        assert!(cpu.blur(a, 1).is_ok());
        assert!(matches!(
            cpu.blur(a, 1),
            Err(NebulaError::Processor { .. })
        ));
    }

    #[tokio::test]
    async fn test_analyze_frame() {
        let mut cpu = CpuEffectProcessor::new(0);
        cpu.init().await.unwrap();
        let flat = cpu.analyze_frame(&[100u8, 100, 100, 255].repeat(4)).unwrap();
        assert!(flat.is_flat);
        assert!((flat.mean_luma - 100.0).abs() < 1e-6);
        assert_eq!(flat.mean_alpha, 255.0);

        let mut pixels = [0u8, 0, 0, 255].repeat(2);
        pixels.extend([255, 255, 255, 255].repeat(2));
        let busy = cpu.analyze_frame(&pixels).unwrap();
        assert!(!busy.is_flat);
    }
}
