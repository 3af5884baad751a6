//! Watermark placement.
//!
//! The stamp is a pre-rasterized RGBA image; text rendering happens
//! upstream. Placement mirrors the editor: nine anchors plus a custom point.

use crate::frame::Frame;
use nebula_common::error::{NebulaError, NebulaResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where the stamp sits on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkAnchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    /// Top-left corner of the stamp in canvas pixels.
    Custom { x: i64, y: i64 },
}

impl Default for WatermarkAnchor {
    fn default() -> Self {
        WatermarkAnchor::BottomRight
    }
}

impl FromStr for WatermarkAnchor {
    type Err = NebulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let anchor = match normalized.as_str() {
            "top-left" => WatermarkAnchor::TopLeft,
            "top-center" | "top" => WatermarkAnchor::TopCenter,
            "top-right" => WatermarkAnchor::TopRight,
            "center-left" | "left" => WatermarkAnchor::CenterLeft,
            "center" => WatermarkAnchor::Center,
            "center-right" | "right" => WatermarkAnchor::CenterRight,
            "bottom-left" => WatermarkAnchor::BottomLeft,
            "bottom-center" | "bottom" => WatermarkAnchor::BottomCenter,
            "bottom-right" => WatermarkAnchor::BottomRight,
            other => {
                // "x,y" for a custom position
                let (x, y) = other
                    .split_once(',')
                    .ok_or_else(|| NebulaError::config(format!("unknown anchor '{s}'")))?;
                let parse = |v: &str| {
                    v.trim()
                        .parse::<i64>()
                        .map_err(|_| NebulaError::config(format!("unknown anchor '{s}'")))
                };
                WatermarkAnchor::Custom {
                    x: parse(x)?,
                    y: parse(y)?,
                }
            }
        };
        Ok(anchor)
    }
}

/// A stamp composited over every output frame.
#[derive(Debug, Clone)]
pub struct Watermark {
    pub stamp: Frame,
    pub anchor: WatermarkAnchor,
    /// Global opacity multiplied into the stamp's own alpha, `[0, 1]`.
    pub opacity: f32,
    /// Distance from the canvas edge for edge anchors, in pixels.
    pub margin: u32,
}

impl Watermark {
    pub fn new(stamp: Frame) -> Self {
        Self {
            stamp,
            anchor: WatermarkAnchor::default(),
            opacity: 0.7,
            margin: 20,
        }
    }

    pub fn with_anchor(mut self, anchor: WatermarkAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> NebulaResult<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(NebulaError::config(format!(
                "watermark opacity {opacity} is outside [0, 1]"
            )));
        }
        self.opacity = opacity;
        Ok(self)
    }

    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    /// Top-left canvas position of the stamp. May be negative or past the
    /// canvas edge; the compositor clips.
    pub fn origin(&self, canvas_width: u32, canvas_height: u32) -> (i64, i64) {
        let (cw, ch) = (canvas_width as i64, canvas_height as i64);
        let (sw, sh) = (self.stamp.width as i64, self.stamp.height as i64);
        let m = self.margin as i64;

        let left = m;
        let hcenter = (cw - sw) / 2;
        let right = cw - sw - m;
        let top = m;
        let vcenter = (ch - sh) / 2;
        let bottom = ch - sh - m;

        match self.anchor {
            WatermarkAnchor::TopLeft => (left, top),
            WatermarkAnchor::TopCenter => (hcenter, top),
            WatermarkAnchor::TopRight => (right, top),
            WatermarkAnchor::CenterLeft => (left, vcenter),
            WatermarkAnchor::Center => (hcenter, vcenter),
            WatermarkAnchor::CenterRight => (right, vcenter),
            WatermarkAnchor::BottomLeft => (left, bottom),
            WatermarkAnchor::BottomCenter => (hcenter, bottom),
            WatermarkAnchor::BottomRight => (right, bottom),
            WatermarkAnchor::Custom { x, y } => (x, y),
        }
    }
}
