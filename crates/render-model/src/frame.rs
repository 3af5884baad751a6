//! Raw RGBA frames and canvas sizing.

use nebula_common::error::{NebulaError, NebulaResult};
use serde::{Deserialize, Serialize};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// A raw RGBA8 frame, row-major, not premultiplied.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    /// Wrap pixel data, checking that it is exactly `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> NebulaResult<Self> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(NebulaError::invalid_state(format!(
                "frame data is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BYTES_PER_PIXEL);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Byte length of a frame with the given dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel at `(x, y)`. Panics if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Nearest-neighbour rescale to `width x height`.
    ///
    /// Returns a clone when the dimensions already match.
    pub fn scaled_to(&self, width: u32, height: u32) -> Frame {
        if self.width == width && self.height == height {
            return self.clone();
        }
        if self.width == 0 || self.height == 0 {
            return Frame::solid(width, height, [0, 0, 0, 255]);
        }

        let mut data = Vec::with_capacity(Self::byte_len(width, height));
        for y in 0..height {
            let sy = (y as u64 * self.height as u64 / height.max(1) as u64) as usize;
            let row = sy * self.width as usize;
            for x in 0..width {
                let sx = (x as u64 * self.width as u64 / width.max(1) as u64) as usize;
                let idx = (row + sx) * BYTES_PER_PIXEL;
                data.extend_from_slice(&self.data[idx..idx + BYTES_PER_PIXEL]);
            }
        }

        Frame {
            width,
            height,
            data,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Per-frame statistics reported by the effect processor's analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    /// Mean Rec.601 luma in `[0, 255]`.
    pub mean_luma: f64,
    /// Luma variance; a cheap contrast/complexity estimate.
    pub luma_variance: f64,
    /// Mean alpha in `[0, 255]`.
    pub mean_alpha: f64,
    /// Whether the frame is effectively a single flat color.
    pub is_flat: bool,
}

/// Compute the render canvas for a set of source dimensions.
///
/// The canvas is the largest source extent on each axis, scaled down
/// (aspect preserved) to fit `max_width x max_height`, and rounded down to
/// even dimensions so 4:2:0 encoders accept it.
pub fn canvas_size(sources: &[(u32, u32)], max_width: u32, max_height: u32) -> (u32, u32) {
    let width = sources.iter().map(|(w, _)| *w).max().unwrap_or(0).max(2);
    let height = sources.iter().map(|(_, h)| *h).max().unwrap_or(0).max(2);

    let (mut w, mut h) = (width as f64, height as f64);
    if width > max_width || height > max_height {
        let scale = (max_width as f64 / w).min(max_height as f64 / h);
        w = (w * scale).floor();
        h = (h * scale).floor();
    }

    let even = |v: f64| ((v as u32) & !1).max(2);
    (even(w), even(h))
}
