//! Final per-frame composition: watermark overlay and alpha flattening.
//!
//! Runs after effects, right before the frame reaches the sink. Encoders
//! take opaque RGBA, so any transparency left by chroma keying is resolved
//! against a background color here.

use nebula_render_model::{Frame, Watermark};

/// Default background behind transparent pixels.
pub const DEFAULT_BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Composes output frames for one canvas size.
#[derive(Debug, Clone)]
pub struct Compositor {
    watermark: Option<Watermark>,
    background: [u8; 4],
}

impl Compositor {
    pub fn new(watermark: Option<Watermark>, background: [u8; 4]) -> Self {
        Self {
            watermark,
            background,
        }
    }

    /// Overlay the watermark, then flatten to opaque.
    pub fn compose(&self, mut frame: Frame) -> Frame {
        if let Some(watermark) = &self.watermark {
            overlay_watermark(&mut frame, watermark);
        }
        flatten_opaque(&mut frame.data, self.background);
        frame
    }
}

/// Alpha-blend the stamp at its anchor. Parts outside the canvas are clipped.
pub fn overlay_watermark(frame: &mut Frame, watermark: &Watermark) {
    let (cw, ch) = (frame.width as i64, frame.height as i64);
    let (ox, oy) = watermark.origin(frame.width, frame.height);
    let stamp = &watermark.stamp;

    for sy in 0..stamp.height as i64 {
        let y = oy + sy;
        if y < 0 || y >= ch {
            continue;
        }
        for sx in 0..stamp.width as i64 {
            let x = ox + sx;
            if x < 0 || x >= cw {
                continue;
            }
            let s = ((sy * stamp.width as i64 + sx) * 4) as usize;
            let d = ((y * cw + x) * 4) as usize;
            let a = stamp.data[s + 3] as f32 / 255.0 * watermark.opacity;
            if a <= 0.0 {
                continue;
            }
            for c in 0..3 {
                let under = frame.data[d + c] as f32;
                let over = stamp.data[s + c] as f32;
                frame.data[d + c] = (under + (over - under) * a).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Composite straight-alpha RGBA over `background`, leaving alpha at 255.
pub fn flatten_opaque(data: &mut [u8], background: [u8; 4]) {
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            px[c] = (mul_div255(px[c] as u16, a) + mul_div255(background[c] as u16, inv)).min(255)
                as u8;
        }
        px[3] = 255;
    }
}

fn mul_div255(x: u16, a: u16) -> u16 {
    ((x as u32 * a as u32 + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use nebula_render_model::WatermarkAnchor;

    use super::*;

    #[test]
    fn test_flatten_keeps_opaque_pixels() {
        let mut data = vec![10, 20, 30, 255, 200, 100, 50, 0];
        flatten_opaque(&mut data, [1, 2, 3, 255]);
        assert_eq!(&data[..4], &[10, 20, 30, 255]);
        assert_eq!(&data[4..], &[1, 2, 3, 255]);
    }

    #[test]
    fn test_flatten_half_alpha() {
        let mut data = vec![255, 255, 255, 128];
        flatten_opaque(&mut data, [0, 0, 0, 255]);
        assert_eq!(data, vec![128, 128, 128, 255]);
    }

    #[test]
    fn test_watermark_lands_bottom_right() {
        let stamp = Frame::solid(2, 2, [255, 255, 255, 255]);
        let watermark = Watermark::new(stamp)
            .with_margin(1)
            .with_opacity(1.0)
            .unwrap();
        let compositor = Compositor::new(Some(watermark), DEFAULT_BACKGROUND);
        let out = compositor.compose(Frame::solid(8, 6, [0, 0, 0, 255]));

        assert_eq!(out.pixel(5, 3), [255, 255, 255, 255]);
        assert_eq!(out.pixel(6, 4), [255, 255, 255, 255]);
        assert_eq!(out.pixel(7, 5), [0, 0, 0, 255]);
        assert_eq!(out.pixel(4, 3), [0, 0, 0, 255]);
    }

    #[test]
    fn test_watermark_opacity_and_clipping() {
        let stamp = Frame::solid(4, 4, [200, 200, 200, 255]);
        let watermark = Watermark::new(stamp)
            .with_anchor(WatermarkAnchor::Custom { x: -2, y: -2 })
            .with_opacity(0.5)
            .unwrap();
        let mut frame = Frame::solid(4, 4, [0, 0, 0, 255]);
        overlay_watermark(&mut frame, &watermark);

        assert_eq!(frame.pixel(0, 0), [100, 100, 100, 255]);
        assert_eq!(frame.pixel(1, 1), [100, 100, 100, 255]);
        assert_eq!(frame.pixel(2, 2), [0, 0, 0, 255]);
    }
}
