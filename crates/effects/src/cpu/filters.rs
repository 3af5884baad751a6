//! In-place RGBA filters.

#[inline]
pub(crate) fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Largest distance between two RGB colors.
const MAX_RGB_DISTANCE: f32 = 441.67;

/// Key out pixels near `key`.
///
/// Pixels closer than `tolerance` become transparent, with a linear ramp
/// across the outer `softness` of that band. Spill suppression pulls the
/// dominant key channel toward the other two, but only for pixels inside
/// the band that stay visible. A non-positive tolerance keys nothing.
pub fn chroma_key(
    data: &mut [u8],
    key: [u8; 3],
    tolerance: f32,
    softness: f32,
    spill_suppression: f32,
) {
    if tolerance <= 0.0 {
        return;
    }
    let tol = tolerance * MAX_RGB_DISTANCE;
    let soft = (softness * MAX_RGB_DISTANCE).min(tol);
    let [kr, kg, kb] = key.map(|c| c as f32);
    let green_screen = key[1] > key[0] && key[1] > key[2];
    let blue_screen = key[2] > key[0] && key[2] > key[1];

    for px in data.chunks_exact_mut(4) {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        let distance = ((r - kr).powi(2) + (g - kg).powi(2) + (b - kb).powi(2)).sqrt();
        if distance >= tol {
            continue;
        }

        let hard_edge = tol - soft;
        let alpha = if distance < hard_edge || soft <= 0.0 {
            0.0
        } else {
            (distance - hard_edge) / soft
        };

        if spill_suppression > 0.0 && alpha > 0.1 {
            let spill = (1.0 - distance / MAX_RGB_DISTANCE) * spill_suppression;
            if green_screen {
                let avg = (r + b) / 2.0;
                px[1] = clamp_u8(g * (1.0 - spill) + avg * spill);
            } else if blue_screen {
                let avg = (r + g) / 2.0;
                px[2] = clamp_u8(b * (1.0 - spill) + avg * spill);
            }
        }

        px[3] = clamp_u8(px[3] as f32 * alpha);
    }
}

/// Brightness, contrast, and saturation in `[-100, 100]`; hue shift in degrees.
pub fn color_grade(data: &mut [u8], brightness: f32, contrast: f32, saturation: f32, hue: f32) {
    let brightness = brightness / 100.0 * 255.0;
    let contrast = (contrast + 100.0) / 100.0;
    let saturation_scale = (saturation + 100.0) / 100.0;
    let adjust_hsv = saturation != 0.0 || hue != 0.0;

    for px in data.chunks_exact_mut(4) {
        let mut rgb = [0u8; 3];
        for c in 0..3 {
            let v = px[c] as f32 + brightness;
            rgb[c] = clamp_u8(((v / 255.0 - 0.5) * contrast + 0.5) * 255.0);
        }

        if adjust_hsv {
            let (h, s, v) = rgb_to_hsv(rgb);
            let h = (h + hue + 360.0).rem_euclid(360.0);
            let s = (s * saturation_scale).clamp(0.0, 1.0);
            rgb = hsv_to_rgb(h, s, v);
        }
        px[..3].copy_from_slice(&rgb);
    }
}

/// Separable box blur with edge clamping.
pub fn blur(data: &mut [u8], width: usize, height: usize, radius: u32) {
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let r = radius as isize;
    let count = (2 * r + 1) as u32;
    let mut temp = vec![0u8; data.len()];

    for y in 0..height {
        for x in 0..width {
            let mut sum = [0u32; 4];
            for dx in -r..=r {
                let nx = (x as isize + dx).clamp(0, width as isize - 1) as usize;
                let idx = (y * width + nx) * 4;
                for c in 0..4 {
                    sum[c] += data[idx + c] as u32;
                }
            }
            let idx = (y * width + x) * 4;
            for c in 0..4 {
                temp[idx + c] = (sum[c] / count) as u8;
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            let mut sum = [0u32; 4];
            for dy in -r..=r {
                let ny = (y as isize + dy).clamp(0, height as isize - 1) as usize;
                let idx = (ny * width + x) * 4;
                for c in 0..4 {
                    sum[c] += temp[idx + c] as u32;
                }
            }
            let idx = (y * width + x) * 4;
            for c in 0..4 {
                data[idx + c] = (sum[c] / count) as u8;
            }
        }
    }
}

/// Laplacian sharpen on RGB; border pixels are left as is.
pub fn sharpen(data: &mut [u8], width: usize, height: usize, amount: f32) {
    if amount <= 0.0 || width < 3 || height < 3 {
        return;
    }
    let original = data.to_vec();
    let at = |x: usize, y: usize, c: usize| original[(y * width + x) * 4 + c] as f32;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = (y * width + x) * 4;
            for c in 0..3 {
                let center = at(x, y, c);
                let edges = 4.0 * center
                    - at(x, y - 1, c)
                    - at(x, y + 1, c)
                    - at(x - 1, y, c)
                    - at(x + 1, y, c);
                data[idx + c] = clamp_u8(center + edges * amount);
            }
        }
    }
}

/// Darken toward the corners beyond `radius` (fraction of the half-diagonal).
pub fn vignette(data: &mut [u8], width: usize, height: usize, intensity: f32, radius: f32) {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt();
    let inner = max_dist * radius;
    let falloff = (max_dist * (1.0 - radius)).max(f32::EPSILON);

    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance <= inner {
                continue;
            }
            let factor = 1.0 - ((distance - inner) / falloff).min(1.0) * intensity;
            let idx = (y * width + x) * 4;
            for c in 0..3 {
                data[idx + c] = clamp_u8(data[idx + c] as f32 * factor);
            }
        }
    }
}

/// Median filter over a `(2 * strength + 1)` square; borders untouched.
pub fn noise_reduction(data: &mut [u8], width: usize, height: usize, strength: u32) {
    let s = strength as usize;
    if s == 0 || width <= 2 * s || height <= 2 * s {
        return;
    }
    let original = data.to_vec();
    let mut window = Vec::with_capacity((2 * s + 1) * (2 * s + 1));

    for y in s..height - s {
        for x in s..width - s {
            for c in 0..3 {
                window.clear();
                for ny in y - s..=y + s {
                    for nx in x - s..=x + s {
                        window.push(original[(ny * width + nx) * 4 + c]);
                    }
                }
                window.sort_unstable();
                data[(y * width + x) * 4 + c] = window[window.len() / 2];
            }
        }
    }
}

/// Parametric look: temperature, warmth, contrast, saturation, blended by `intensity`.
pub fn apply_lut(
    data: &mut [u8],
    temperature: f32,
    warmth: f32,
    contrast: f32,
    saturation: f32,
    intensity: f32,
) {
    for px in data.chunks_exact_mut(4) {
        let orig = [px[0] as f32, px[1] as f32, px[2] as f32];
        let mut r = orig[0] + temperature * 50.0 + warmth * 30.0;
        let mut g = orig[1] + warmth * 15.0;
        let mut b = orig[2] - temperature * 50.0;

        let stretch = |v: f32| ((v / 255.0 - 0.5) * contrast + 0.5) * 255.0;
        r = stretch(r);
        g = stretch(g);
        b = stretch(b);

        let gray = 0.2989 * r + 0.5870 * g + 0.1140 * b;
        r = gray + saturation * (r - gray);
        g = gray + saturation * (g - gray);
        b = gray + saturation * (b - gray);

        px[0] = clamp_u8(r * intensity + orig[0] * (1.0 - intensity));
        px[1] = clamp_u8(g * intensity + orig[1] * (1.0 - intensity));
        px[2] = clamp_u8(b * intensity + orig[2] * (1.0 - intensity));
    }
}

fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [
        clamp_u8((r + m) * 255.0),
        clamp_u8((g + m) * 255.0),
        clamp_u8((b + m) * 255.0),
    ]
}
