//! Two-input RGBA blends. Every result is fully opaque.

use super::filters::clamp_u8;

fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

fn blend_with(from: &[u8], to: &[u8], mut f: impl FnMut(u8, u8) -> u8) -> Vec<u8> {
    let mut out = vec![0u8; from.len()];
    for ((o, a), b) in out
        .chunks_exact_mut(4)
        .zip(from.chunks_exact(4))
        .zip(to.chunks_exact(4))
    {
        for c in 0..3 {
            o[c] = f(a[c], b[c]);
        }
        o[3] = 255;
    }
    out
}

/// Pick each pixel from `from` or `to` by position.
fn select_with(
    from: &[u8],
    to: &[u8],
    width: usize,
    height: usize,
    take_to: impl Fn(usize, usize) -> bool,
) -> Vec<u8> {
    let mut out = vec![0u8; from.len()];
    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) * 4;
            let src = if take_to(x, y) { to } else { from };
            out[i..i + 3].copy_from_slice(&src[i..i + 3]);
            out[i + 3] = 255;
        }
    }
    out
}

/// Eased opacity blend.
pub fn fade(from: &[u8], to: &[u8], progress: f32) -> Vec<u8> {
    let t = ease_in_out_cubic(progress);
    blend_with(from, to, |a, b| clamp_u8(a as f32 + (b as f32 - a as f32) * t))
}

/// Linear opacity blend.
pub fn crossfade(from: &[u8], to: &[u8], progress: f32) -> Vec<u8> {
    blend_with(from, to, |a, b| {
        clamp_u8(a as f32 * (1.0 - progress) + b as f32 * progress)
    })
}

/// `to` is revealed from the left edge.
pub fn wipe_left(from: &[u8], to: &[u8], w: usize, h: usize, progress: f32) -> Vec<u8> {
    let edge = (w as f32 * progress) as usize;
    select_with(from, to, w, h, |x, _| x < edge)
}

/// `to` is revealed from the right edge.
pub fn wipe_right(from: &[u8], to: &[u8], w: usize, h: usize, progress: f32) -> Vec<u8> {
    let edge = (w as f32 * (1.0 - progress)) as usize;
    select_with(from, to, w, h, |x, _| x >= edge)
}

/// `to` is revealed from the top edge.
pub fn wipe_up(from: &[u8], to: &[u8], w: usize, h: usize, progress: f32) -> Vec<u8> {
    let edge = (h as f32 * progress) as usize;
    select_with(from, to, w, h, |_, y| y < edge)
}

/// `to` is revealed from the bottom edge.
pub fn wipe_down(from: &[u8], to: &[u8], w: usize, h: usize, progress: f32) -> Vec<u8> {
    let edge = (h as f32 * (1.0 - progress)) as usize;
    select_with(from, to, w, h, |_, y| y >= edge)
}

/// `from` slides out to the left while `to` follows it in from the right.
pub fn slide_left(from: &[u8], to: &[u8], w: usize, h: usize, progress: f32) -> Vec<u8> {
    let offset = (w as f32 * ease_in_out_cubic(progress)) as usize;
    let mut out = vec![0u8; from.len()];
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) * 4;
            let shifted = x + offset;
            let src = if shifted < w {
                (y * w + shifted) * 4
            } else {
                (y * w + (shifted - w).min(w - 1)) * 4
            };
            let frame = if shifted < w { from } else { to };
            out[i..i + 3].copy_from_slice(&frame[src..src + 3]);
            out[i + 3] = 255;
        }
    }
    out
}

/// Per-pixel hashed threshold: each pixel switches once `progress` passes it.
pub fn dissolve(from: &[u8], to: &[u8], w: usize, h: usize, progress: f32) -> Vec<u8> {
    select_with(from, to, w, h, |x, y| {
        let hash = (x as u64)
            .wrapping_mul(2_654_435_761)
            .wrapping_add((y as u64).wrapping_mul(2_246_822_519));
        let threshold = (hash % 1000) as f32 / 1000.0;
        progress > threshold
    })
}

/// Fade `from` out to black over the first half, then `to` in from black.
pub fn fade_to_black(from: &[u8], to: &[u8], progress: f32) -> Vec<u8> {
    if progress < 0.5 {
        let k = 1.0 - progress * 2.0;
        blend_with(from, to, |a, _| clamp_u8(a as f32 * k))
    } else {
        let k = (progress - 0.5) * 2.0;
        blend_with(from, to, |_, b| clamp_u8(b as f32 * k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: usize = 4;
    const H: usize = 2;

    fn solid(v: u8) -> Vec<u8> {
        [v, v, v, 255].iter().copied().cycle().take(W * H * 4).collect()
    }

    #[test]
    fn test_endpoints() {
        let (a, b) = (solid(0), solid(200));
        assert_eq!(fade(&a, &b, 0.0), a);
        assert_eq!(fade(&a, &b, 1.0), b);
        assert_eq!(crossfade(&a, &b, 0.0), a);
        assert_eq!(crossfade(&a, &b, 1.0), b);
        assert_eq!(wipe_left(&a, &b, W, H, 0.0), a);
        assert_eq!(wipe_left(&a, &b, W, H, 1.0), b);
        assert_eq!(wipe_right(&a, &b, W, H, 1.0), b);
        assert_eq!(wipe_up(&a, &b, W, H, 1.0), b);
        assert_eq!(wipe_down(&a, &b, W, H, 0.0), a);
        assert_eq!(slide_left(&a, &b, W, H, 0.0), a);
        assert_eq!(slide_left(&a, &b, W, H, 1.0), b);
        assert_eq!(dissolve(&a, &b, W, H, 0.0), a);
        assert_eq!(dissolve(&a, &b, W, H, 1.0), b);
        assert_eq!(fade_to_black(&a, &b, 1.0), b);
    }

    #[test]
    fn test_crossfade_midpoint() {
        let out = crossfade(&solid(0), &solid(200), 0.5);
        assert_eq!(out[0], 100);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn test_fade_to_black_midpoint_is_black() {
        let out = fade_to_black(&solid(180), &solid(90), 0.5);
        assert_eq!(&out[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_wipe_left_halfway() {
        let out = wipe_left(&solid(0), &solid(200), W, H, 0.5);
        assert_eq!(out[0], 200);
        assert_eq!(out[3 * 4], 0);
    }
}
