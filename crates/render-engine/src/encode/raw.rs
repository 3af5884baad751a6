//! Uncompressed in-memory encoder.
//!
//! Stream layout, all integers little-endian:
//!
//! ```text
//! "NBRV" | version u32 | width u32 | height u32 | fps u32 | frame_count u64 | frames...
//! ```
//!
//! Frames follow the header back to back as tightly packed RGBA.

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::Frame;

use super::FrameEncoder;

const MAGIC: &[u8; 4] = b"NBRV";
const VERSION: u32 = 1;
const COUNT_OFFSET: usize = 20;

/// Decoded stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStreamHeader {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u64,
}

impl RawStreamHeader {
    pub const LEN: usize = 28;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.fps.to_le_bytes());
        out.extend_from_slice(&self.frame_count.to_le_bytes());
        out
    }

    /// Parse and check a stream header, including that the payload length
    /// matches the frame count.
    pub fn decode(stream: &[u8]) -> NebulaResult<Self> {
        if stream.len() < Self::LEN || &stream[..4] != MAGIC {
            return Err(NebulaError::encoder("not a raw nebula stream"));
        }
        let u32_at = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&stream[at..at + 4]);
            u32::from_le_bytes(b)
        };
        if u32_at(4) != VERSION {
            return Err(NebulaError::encoder(format!(
                "unsupported raw stream version {}",
                u32_at(4)
            )));
        }
        let mut count = [0u8; 8];
        count.copy_from_slice(&stream[COUNT_OFFSET..COUNT_OFFSET + 8]);

        let header = Self {
            width: u32_at(8),
            height: u32_at(12),
            fps: u32_at(16),
            frame_count: u64::from_le_bytes(count),
        };
        let expected = u64::from(header.width)
            .checked_mul(u64::from(header.height))
            .and_then(|pixels| pixels.checked_mul(4))
            .and_then(|frame_len| frame_len.checked_mul(header.frame_count))
            .and_then(|payload| payload.checked_add(Self::LEN as u64))
            .ok_or_else(|| {
                NebulaError::encoder(format!(
                    "raw stream header overflows: {}x{} with {} frames",
                    header.width, header.height, header.frame_count
                ))
            })?;
        if stream.len() as u64 != expected {
            return Err(NebulaError::encoder(format!(
                "raw stream is {} bytes, header implies {expected}",
                stream.len()
            )));
        }
        Ok(header)
    }

    /// Borrow frame `index` out of a stream with this header.
    pub fn frame<'a>(&self, stream: &'a [u8], index: u64) -> Option<&'a [u8]> {
        if index >= self.frame_count {
            return None;
        }
        let len = Frame::byte_len(self.width, self.height);
        let start = usize::try_from(index)
            .ok()?
            .checked_mul(len)?
            .checked_add(Self::LEN)?;
        stream.get(start..start.checked_add(len)?)
    }
}

/// Collects frames into a single in-memory buffer.
#[derive(Debug, Default)]
pub struct RawVideoEncoder {
    buffer: Vec<u8>,
    frame_len: usize,
    frames: u64,
    begun: bool,
}

impl RawVideoEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FrameEncoder for RawVideoEncoder {
    fn name(&self) -> &str {
        "raw"
    }

    async fn begin(&mut self, width: u32, height: u32, fps: u32) -> NebulaResult<()> {
        let header = RawStreamHeader {
            width,
            height,
            fps,
            frame_count: 0,
        };
        self.buffer = header.encode();
        self.frame_len = Frame::byte_len(width, height);
        self.frames = 0;
        self.begun = true;
        Ok(())
    }

    async fn encode(&mut self, rgba: &[u8]) -> NebulaResult<()> {
        if !self.begun {
            return Err(NebulaError::encoder("raw encoder used before begin"));
        }
        if rgba.len() != self.frame_len {
            return Err(NebulaError::encoder(format!(
                "frame is {} bytes, stream expects {}",
                rgba.len(),
                self.frame_len
            )));
        }
        self.buffer.extend_from_slice(rgba);
        self.frames += 1;
        Ok(())
    }

    async fn finish(&mut self) -> NebulaResult<Vec<u8>> {
        if !self.begun {
            return Err(NebulaError::encoder("raw encoder finished before begin"));
        }
        self.buffer[COUNT_OFFSET..COUNT_OFFSET + 8].copy_from_slice(&self.frames.to_le_bytes());
        self.begun = false;
        Ok(std::mem::take(&mut self.buffer))
    }

    async fn abort(&mut self) {
        self.buffer = Vec::new();
        self.frames = 0;
        self.begun = false;
    }
}
