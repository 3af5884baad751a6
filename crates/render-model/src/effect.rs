//! Effect and transition operations.
//!
//! Both enumerations are closed: every kind the pipeline knows is a
//! variant, and anything else parses into an explicit `Unsupported`
//! variant that the invoker resolves to a fixed fallback (identity for
//! filters, fade for transitions) instead of failing the render.

use nebula_common::error::{NebulaError, NebulaResult};
use serde::{Deserialize, Serialize};

/// A single-frame filter with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterOp {
    /// No-op; the frame passes through untouched.
    Identity,

    /// Green/blue screen removal.
    ChromaKey {
        color: [u8; 3],
        /// Fraction of the maximum RGB distance keyed out, `[0, 1]`.
        tolerance: f32,
        /// Fraction of the tolerance band that fades instead of cutting, `[0, 1]`.
        softness: f32,
        /// Strength of key-color spill removal, `[0, 1]`.
        spill_suppression: f32,
    },

    /// Brightness/contrast/saturation in `[-100, 100]`, hue shift in degrees.
    ColorGrade {
        brightness: f32,
        contrast: f32,
        saturation: f32,
        hue: f32,
    },

    /// Box blur, radius in pixels (`0..=20`).
    Blur { radius: u32 },

    /// Unsharp kernel, amount `0..=2`.
    Sharpen { amount: f32 },

    Vignette { intensity: f32, radius: f32 },

    /// Median filter, strength `1..=3`.
    NoiseReduction { strength: u32 },

    /// Parametric look-up-table grade blended by `intensity`.
    Lut {
        temperature: f32,
        warmth: f32,
        contrast: f32,
        saturation: f32,
        intensity: f32,
    },

    /// A kind this pipeline does not know. Rendered as [`FilterOp::Identity`].
    Unsupported { kind: String },
}

impl FilterOp {
    /// Parse a filter from its kind name and a JSON parameter object.
    ///
    /// Missing parameters take the same defaults the editor UI uses.
    /// Unknown kinds become [`FilterOp::Unsupported`]; malformed parameters
    /// for a known kind are an error.
    pub fn parse(kind: &str, params: &serde_json::Value) -> NebulaResult<Self> {
        let normalized = kind.trim().to_ascii_lowercase().replace(['-', '_'], "");
        if normalized.is_empty() {
            return Err(NebulaError::plan("filter kind must be non-empty"));
        }

        let params = ParamReader::new(&normalized, params)?;
        let op = match normalized.as_str() {
            "identity" | "none" | "passthrough" => FilterOp::Identity,
            "chromakey" | "greenscreen" => FilterOp::ChromaKey {
                color: match params.str("color") {
                    Some(hex) => parse_hex_color(hex)?,
                    None => [0, 255, 0],
                },
                tolerance: params.f32_or("tolerance", 0.4)?.clamp(0.0, 1.0),
                softness: params.f32_or("softness", 0.1)?.clamp(0.0, 1.0),
                spill_suppression: params.f32_or("spill_suppression", 0.3)?.clamp(0.0, 1.0),
            },
            "colorgrade" => FilterOp::ColorGrade {
                brightness: params.f32_or("brightness", 0.0)?.clamp(-100.0, 100.0),
                contrast: params.f32_or("contrast", 0.0)?.clamp(-100.0, 100.0),
                saturation: params.f32_or("saturation", 0.0)?.clamp(-100.0, 100.0),
                hue: params.f32_or("hue", 0.0)?.clamp(-180.0, 180.0),
            },
            "blur" => FilterOp::Blur {
                radius: params.f32_or("radius", 5.0)?.round().clamp(0.0, 20.0) as u32,
            },
            "sharpen" => FilterOp::Sharpen {
                amount: params.f32_or("amount", 1.0)?.clamp(0.0, 2.0),
            },
            "vignette" => FilterOp::Vignette {
                intensity: params.f32_or("intensity", 0.5)?.clamp(0.0, 1.0),
                radius: params.f32_or("radius", 0.5)?.clamp(0.0, 1.0),
            },
            "noisereduction" | "denoise" => FilterOp::NoiseReduction {
                strength: params.f32_or("strength", 1.0)?.round().clamp(1.0, 3.0) as u32,
            },
            "lut" => FilterOp::Lut {
                temperature: params.f32_or("temperature", 0.0)?,
                warmth: params.f32_or("warmth", 0.0)?,
                contrast: params.f32_or("contrast", 1.0)?,
                saturation: params.f32_or("saturation", 1.0)?,
                intensity: params.f32_or("intensity", 1.0)?.clamp(0.0, 1.0),
            },
            _ => FilterOp::Unsupported {
                kind: kind.trim().to_string(),
            },
        };
        Ok(op)
    }

    /// Stable name used in logs.
    pub fn name(&self) -> &str {
        match self {
            FilterOp::Identity => "identity",
            FilterOp::ChromaKey { .. } => "chroma-key",
            FilterOp::ColorGrade { .. } => "color-grade",
            FilterOp::Blur { .. } => "blur",
            FilterOp::Sharpen { .. } => "sharpen",
            FilterOp::Vignette { .. } => "vignette",
            FilterOp::NoiseReduction { .. } => "noise-reduction",
            FilterOp::Lut { .. } => "lut",
            FilterOp::Unsupported { kind } => kind,
        }
    }

    /// Whether applying this filter leaves the frame unchanged.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FilterOp::Identity | FilterOp::Unsupported { .. })
    }
}

/// A two-input blend between an outgoing and an incoming frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    Fade,
    Crossfade,
    WipeLeft,
    WipeRight,
    WipeUp,
    WipeDown,
    SlideLeft,
    Dissolve,
    FadeToBlack,
    /// A kind this pipeline does not know. Rendered as [`TransitionKind::Fade`].
    Unsupported { kind: String },
}

impl TransitionKind {
    /// Every supported kind, in catalog order.
    pub const CATALOG: [TransitionKind; 9] = [
        TransitionKind::Fade,
        TransitionKind::Crossfade,
        TransitionKind::WipeLeft,
        TransitionKind::WipeRight,
        TransitionKind::WipeUp,
        TransitionKind::WipeDown,
        TransitionKind::SlideLeft,
        TransitionKind::Dissolve,
        TransitionKind::FadeToBlack,
    ];

    /// Editor kinds with no dedicated blend. They parse as
    /// [`TransitionKind::Unsupported`] and render as a fade.
    pub const FADED: [&'static str; 4] = ["slide-right", "slide-up", "slide-down", "fade-to-white"];

    /// Parse a transition kind, accepting kebab, camel, and squashed spellings.
    pub fn parse(kind: &str) -> Self {
        let normalized = kind.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        match normalized.as_str() {
            "fade" => TransitionKind::Fade,
            "crossfade" => TransitionKind::Crossfade,
            "wipeleft" => TransitionKind::WipeLeft,
            "wiperight" => TransitionKind::WipeRight,
            "wipeup" => TransitionKind::WipeUp,
            "wipedown" => TransitionKind::WipeDown,
            "slideleft" => TransitionKind::SlideLeft,
            "dissolve" => TransitionKind::Dissolve,
            "fadetoblack" => TransitionKind::FadeToBlack,
            _ => TransitionKind::Unsupported {
                kind: kind.trim().to_string(),
            },
        }
    }

    /// Whether this is an editor kind known to render as a fade.
    pub fn is_faded(&self) -> bool {
        match self {
            TransitionKind::Unsupported { kind } => {
                let normalized = kind.to_ascii_lowercase().replace(['-', '_', ' '], "");
                Self::FADED
                    .iter()
                    .any(|name| name.replace('-', "") == normalized)
            }
            _ => false,
        }
    }

    /// Canonical kebab-case name.
    pub fn name(&self) -> &str {
        match self {
            TransitionKind::Fade => "fade",
            TransitionKind::Crossfade => "crossfade",
            TransitionKind::WipeLeft => "wipe-left",
            TransitionKind::WipeRight => "wipe-right",
            TransitionKind::WipeUp => "wipe-up",
            TransitionKind::WipeDown => "wipe-down",
            TransitionKind::SlideLeft => "slide-left",
            TransitionKind::Dissolve => "dissolve",
            TransitionKind::FadeToBlack => "fade-to-black",
            TransitionKind::Unsupported { kind } => kind,
        }
    }

    /// Human-readable label for listings.
    pub fn label(&self) -> &str {
        match self {
            TransitionKind::Fade => "Fade",
            TransitionKind::Crossfade => "Crossfade",
            TransitionKind::WipeLeft => "Wipe Left",
            TransitionKind::WipeRight => "Wipe Right",
            TransitionKind::WipeUp => "Wipe Up",
            TransitionKind::WipeDown => "Wipe Down",
            TransitionKind::SlideLeft => "Slide Left",
            TransitionKind::Dissolve => "Dissolve",
            TransitionKind::FadeToBlack => "Fade to Black",
            TransitionKind::Unsupported { .. } => "Unsupported",
        }
    }
}

/// Named transition presets offered by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPreset {
    Quick,
    Standard,
    Smooth,
    Dramatic,
    Slideshow,
    Cinematic,
}

impl TransitionPreset {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "quick" => Some(Self::Quick),
            "standard" => Some(Self::Standard),
            "smooth" => Some(Self::Smooth),
            "dramatic" => Some(Self::Dramatic),
            "slideshow" => Some(Self::Slideshow),
            "cinematic" => Some(Self::Cinematic),
            _ => None,
        }
    }

    /// Transition kind and duration in seconds for this preset.
    pub fn resolve(self) -> (TransitionKind, f64) {
        match self {
            Self::Quick => (TransitionKind::Fade, 0.5),
            Self::Standard => (TransitionKind::Crossfade, 1.0),
            Self::Smooth => (TransitionKind::Dissolve, 1.5),
            Self::Dramatic => (TransitionKind::FadeToBlack, 2.0),
            Self::Slideshow => (TransitionKind::SlideLeft, 0.8),
            Self::Cinematic => (TransitionKind::FadeToBlack, 2.5),
        }
    }
}

/// One declarative request to the effect processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EffectOperation {
    /// Transform one frame.
    Filter(FilterOp),
    /// Blend two frames at `progress` in `[0, 1]`.
    Transition { kind: TransitionKind, progress: f32 },
}

/// Parse `#rrggbb` (or `rrggbb`) into an RGB triple.
pub fn parse_hex_color(hex: &str) -> NebulaResult<[u8; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(NebulaError::plan(format!("invalid hex color '{hex}'")));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map_err(|_| NebulaError::plan(format!("invalid hex color '{hex}'")))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

struct ParamReader<'a> {
    kind: &'a str,
    params: Option<&'a serde_json::Map<String, serde_json::Value>>,
}

impl<'a> ParamReader<'a> {
    fn new(kind: &'a str, params: &'a serde_json::Value) -> NebulaResult<Self> {
        let params = if params.is_null() {
            None
        } else {
            Some(params.as_object().ok_or_else(|| {
                NebulaError::plan(format!("{kind} params must be a JSON object"))
            })?)
        };
        Ok(Self { kind, params })
    }

    fn get(&self, key: &str) -> Option<&'a serde_json::Value> {
        let params = self.params?;
        params.get(key).or_else(|| params.get(&snake_to_camel(key)))
    }

    fn str(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(|v| v.as_str())
    }

    fn f32_or(&self, key: &str, default: f32) -> NebulaResult<f32> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(value) => {
                let v = value.as_f64().ok_or_else(|| {
                    NebulaError::plan(format!("{}.{key} must be a number", self.kind))
                })? as f32;
                if !v.is_finite() {
                    return Err(NebulaError::plan(format!(
                        "{}.{key} must be finite",
                        self.kind
                    )));
                }
                Ok(v)
            }
        }
    }
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
