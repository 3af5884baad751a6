//! Render requests, encoding descriptors, and finished artifacts.

use crate::plan::RenderPlan;
use crate::watermark::Watermark;
use nebula_common::error::{NebulaError, NebulaResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Webm,
    Mp4,
    /// Uncompressed frame dump with a small header.
    Raw,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
            Container::Raw => "nbrv",
        }
    }

    /// Codec used when none is given.
    pub fn default_codec(&self) -> VideoCodec {
        match self {
            Container::Webm => VideoCodec::Vp8,
            Container::Mp4 => VideoCodec::H264,
            Container::Raw => VideoCodec::Raw,
        }
    }
}

impl FromStr for Container {
    type Err = NebulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(Container::Webm),
            "mp4" => Ok(Container::Mp4),
            "raw" | "nbrv" => Ok(Container::Raw),
            other => Err(NebulaError::config(format!("unknown container '{other}'"))),
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Container::Webm => "webm",
            Container::Mp4 => "mp4",
            Container::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Video codec hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp8,
    Vp9,
    H264,
    H265,
    Raw,
}

impl FromStr for VideoCodec {
    type Err = NebulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vp8" => Ok(VideoCodec::Vp8),
            "vp9" => Ok(VideoCodec::Vp9),
            "h264" | "avc" => Ok(VideoCodec::H264),
            "h265" | "hevc" => Ok(VideoCodec::H265),
            "raw" | "rawvideo" => Ok(VideoCodec::Raw),
            other => Err(NebulaError::config(format!("unknown video codec '{other}'"))),
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VideoCodec::Vp8 => "vp8",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Container, codec, and bitrate for the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingDescriptor {
    pub container: Container,
    pub codec: VideoCodec,
    pub bitrate_kbps: u32,
}

impl Default for EncodingDescriptor {
    fn default() -> Self {
        Self {
            container: Container::Webm,
            codec: VideoCodec::Vp8,
            bitrate_kbps: 2500,
        }
    }
}

impl EncodingDescriptor {
    /// Build from config-style strings. An empty codec picks the container default.
    pub fn parse(container: &str, codec: &str, bitrate_kbps: u32) -> NebulaResult<Self> {
        let container: Container = container.parse()?;
        let codec = if codec.trim().is_empty() {
            container.default_codec()
        } else {
            codec.parse()?
        };
        let descriptor = Self {
            container,
            codec,
            bitrate_kbps,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Reject codec/container pairs no encoder here can produce.
    pub fn validate(&self) -> NebulaResult<()> {
        let ok = matches!(
            (self.container, self.codec),
            (Container::Webm, VideoCodec::Vp8 | VideoCodec::Vp9)
                | (Container::Mp4, VideoCodec::H264 | VideoCodec::H265)
                | (Container::Raw, VideoCodec::Raw)
        );
        if !ok {
            return Err(NebulaError::config(format!(
                "codec {} cannot be stored in a {} container",
                self.codec, self.container
            )));
        }
        if self.container != Container::Raw && self.bitrate_kbps == 0 {
            return Err(NebulaError::config("bitrate must be positive"));
        }
        Ok(())
    }

    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }
}

/// Everything needed to run one render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub plan: RenderPlan,
    pub encoding: EncodingDescriptor,
    /// Canvas cap; larger sources are scaled down.
    pub max_width: u32,
    pub max_height: u32,
    pub watermark: Option<Watermark>,
}

impl RenderRequest {
    pub fn new(plan: RenderPlan, encoding: EncodingDescriptor) -> Self {
        Self {
            plan,
            encoding,
            max_width: 1920,
            max_height: 1080,
            watermark: None,
        }
    }

    pub fn with_max_size(mut self, max_width: u32, max_height: u32) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = Some(watermark);
        self
    }

    /// Target frame rate, taken from the plan.
    pub fn fps(&self) -> u32 {
        self.plan.fps
    }

    pub fn validate(&self) -> NebulaResult<()> {
        self.plan.validate()?;
        self.encoding.validate()?;
        if self.max_width < 2 || self.max_height < 2 {
            return Err(NebulaError::config("canvas cap must be at least 2x2"));
        }
        Ok(())
    }
}

/// Derived facts about a finished artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub duration_secs: f64,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub fps: u32,
    pub container: Container,
    pub codec: VideoCodec,
    /// RFC 3339 timestamp of finalization.
    pub created_at: String,
}

/// A finalized encoded stream. Only ever built from a completed render.
#[derive(Clone)]
pub struct OutputArtifact {
    pub bytes: Vec<u8>,
    pub metadata: ArtifactMetadata,
}

impl std::fmt::Debug for OutputArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputArtifact")
            .field("bytes", &self.bytes.len())
            .field("metadata", &self.metadata)
            .finish()
    }
}
