//! Effect invoker: turns effect operations into processor calls.
//!
//! Each call moves pixels through the buffer exchange as
//! allocate, write, invoke, read back, free. The whole sequence runs inside
//! [`BufferExchange::scope`], so a processor failure midway still releases
//! every buffer the call reserved.

use std::collections::HashSet;

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::{EffectOperation, FilterOp, Frame, FrameMetrics, TransitionKind};

use crate::exchange::{BufferExchange, BufferHandle, ExchangeStats};
use crate::processor::{BufferPtr, NativeEffectProcessor};

/// Dispatches filters and transitions for frames of one fixed size.
pub struct EffectInvoker<'p> {
    exchange: BufferExchange<'p>,
    width: u32,
    height: u32,
    warned: HashSet<String>,
    fallbacks: u64,
}

impl<'p> EffectInvoker<'p> {
    /// Bind an initialized processor to frames of `width x height`.
    pub fn new(
        processor: &'p mut dyn NativeEffectProcessor,
        width: u32,
        height: u32,
    ) -> NebulaResult<Self> {
        if !processor.is_ready() {
            return Err(NebulaError::invalid_state(
                "effect processor used before init",
            ));
        }
        processor.set_dimensions(width, height);
        Ok(Self {
            exchange: BufferExchange::new(processor),
            width,
            height,
            warned: HashSet::new(),
            fallbacks: 0,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Buffer accounting for every call made so far.
    pub fn stats(&self) -> ExchangeStats {
        self.exchange.stats()
    }

    /// How many unsupported operations were replaced by their fallback.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks
    }

    /// Free anything still live. Only non-zero after a bug or a panic mid-call.
    pub fn release_all(&mut self) -> usize {
        self.exchange.release_all()
    }

    /// Run one declarative operation. Filters take one input, transitions two.
    pub fn invoke(&mut self, op: &EffectOperation, inputs: &[&Frame]) -> NebulaResult<Frame> {
        match (op, inputs) {
            (EffectOperation::Filter(filter), [frame]) => {
                self.apply_filter((*frame).clone(), filter)
            }
            (EffectOperation::Transition { kind, progress }, [from, to]) => {
                self.apply_transition(from, to, kind, *progress)
            }
            (EffectOperation::Filter(_), _) => Err(NebulaError::invalid_state(format!(
                "filter needs 1 input frame, got {}",
                inputs.len()
            ))),
            (EffectOperation::Transition { .. }, _) => Err(NebulaError::invalid_state(format!(
                "transition needs 2 input frames, got {}",
                inputs.len()
            ))),
        }
    }

    /// Apply one filter. Unsupported kinds return the frame untouched.
    pub fn apply_filter(&mut self, frame: Frame, op: &FilterOp) -> NebulaResult<Frame> {
        self.check_frame(&frame)?;
        match op {
            FilterOp::Identity => return Ok(frame),
            FilterOp::Unsupported { kind } => {
                self.note_fallback("filter", kind, "identity");
                return Ok(frame);
            }
            _ => {}
        }

        let (width, height) = (frame.width, frame.height);
        let len = frame.data.len();
        let data = self.exchange.scope(|ex| {
            let input = ex.allocate(len)?;
            ex.write(&input, &frame.data)?;
            let out = dispatch_filter(ex.processor(), input.ptr(), op)?;
            collect_result(ex, input, out, len)
        })?;
        tracing::trace!(filter = op.name(), "Filter applied");
        Frame::new(width, height, data)
    }

    /// Apply filters in order.
    pub fn apply_chain(&mut self, mut frame: Frame, ops: &[FilterOp]) -> NebulaResult<Frame> {
        for op in ops {
            frame = self.apply_filter(frame, op)?;
        }
        Ok(frame)
    }

    /// Blend `from` into `to` at `progress`. Unsupported kinds blend as a fade.
    pub fn apply_transition(
        &mut self,
        from: &Frame,
        to: &Frame,
        kind: &TransitionKind,
        progress: f32,
    ) -> NebulaResult<Frame> {
        self.check_frame(from)?;
        self.check_frame(to)?;
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        let kind = match kind {
            TransitionKind::Unsupported { kind } => {
                self.note_fallback("transition", kind, "fade");
                &TransitionKind::Fade
            }
            other => other,
        };

        let len = from.data.len();
        let data = self.exchange.scope(|ex| {
            let a = ex.allocate(len)?;
            ex.write(&a, &from.data)?;
            let b = ex.allocate(len)?;
            ex.write(&b, &to.data)?;

            let out_ptr = dispatch_transition(ex.processor(), a.ptr(), b.ptr(), kind, progress)?;
            let out = ex.adopt(out_ptr, len)?;
            let pixels = ex.read_back(&out, len)?;
            ex.free(out)?;
            ex.free(b)?;
            ex.free(a)?;
            Ok(pixels)
        })?;
        Frame::new(from.width, from.height, data)
    }

    /// Frame statistics from the processor.
    pub fn analyze(&mut self, frame: &Frame) -> NebulaResult<FrameMetrics> {
        self.check_frame(frame)?;
        self.exchange.processor().analyze_frame(&frame.data)
    }

    fn check_frame(&self, frame: &Frame) -> NebulaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(NebulaError::invalid_state(format!(
                "frame is {}x{}, invoker expects {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        Ok(())
    }

    fn note_fallback(&mut self, what: &str, kind: &str, fallback: &str) {
        self.fallbacks += 1;
        if self.warned.insert(format!("{what}:{kind}")) {
            let err = NebulaError::unsupported(format!("{what} kind '{kind}'"));
            tracing::warn!(error = %err, fallback, "Falling back for unsupported {}", what);
        }
    }
}

/// Read the filter result and free the buffers involved.
///
/// Filters normally write in place; if the processor handed back a
/// different buffer, it is adopted and freed as well.
fn collect_result(
    ex: &mut BufferExchange<'_>,
    input: BufferHandle,
    out: BufferPtr,
    len: usize,
) -> NebulaResult<Vec<u8>> {
    if out == input.ptr() {
        let pixels = ex.read_back(&input, len)?;
        ex.free(input)?;
        return Ok(pixels);
    }
    let result = ex.adopt(out, len)?;
    let pixels = ex.read_back(&result, len)?;
    ex.free(result)?;
    ex.free(input)?;
    Ok(pixels)
}

fn dispatch_filter(
    processor: &mut dyn NativeEffectProcessor,
    ptr: BufferPtr,
    op: &FilterOp,
) -> NebulaResult<BufferPtr> {
    match *op {
        FilterOp::ChromaKey {
            color,
            tolerance,
            softness,
            spill_suppression,
        } => processor.chroma_key(ptr, color, tolerance, softness, spill_suppression),
        FilterOp::ColorGrade {
            brightness,
            contrast,
            saturation,
            hue,
        } => processor.color_grade(ptr, brightness, contrast, saturation, hue),
        FilterOp::Blur { radius } => processor.blur(ptr, radius),
        FilterOp::Sharpen { amount } => processor.sharpen(ptr, amount),
        FilterOp::Vignette { intensity, radius } => processor.vignette(ptr, intensity, radius),
        FilterOp::NoiseReduction { strength } => processor.noise_reduction(ptr, strength),
        FilterOp::Lut {
            temperature,
            warmth,
            contrast,
            saturation,
            intensity,
        } => processor.apply_lut(ptr, temperature, warmth, contrast, saturation, intensity),
        FilterOp::Identity | FilterOp::Unsupported { .. } => Ok(ptr),
    }
}

fn dispatch_transition(
    processor: &mut dyn NativeEffectProcessor,
    from: BufferPtr,
    to: BufferPtr,
    kind: &TransitionKind,
    progress: f32,
) -> NebulaResult<BufferPtr> {
    match kind {
        TransitionKind::Fade | TransitionKind::Unsupported { .. } => {
            processor.fade(from, to, progress)
        }
        TransitionKind::Crossfade => processor.crossfade(from, to, progress),
        TransitionKind::WipeLeft => processor.wipe_left(from, to, progress),
        TransitionKind::WipeRight => processor.wipe_right(from, to, progress),
        TransitionKind::WipeUp => processor.wipe_up(from, to, progress),
        TransitionKind::WipeDown => processor.wipe_down(from, to, progress),
        TransitionKind::SlideLeft => processor.slide_left(from, to, progress),
        TransitionKind::Dissolve => processor.dissolve(from, to, progress),
        TransitionKind::FadeToBlack => processor.fade_to_black(from, to, progress),
    }
}
