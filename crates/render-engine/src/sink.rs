//! Output sink: feeds composed frames to an encoder in order and produces
//! the output artifact.

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::{ArtifactMetadata, EncodingDescriptor, Frame, OutputArtifact};

use crate::encode::FrameEncoder;

/// Lifecycle of an [`OutputSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Idle,
    Started,
    Stopped,
    Aborted,
}

pub struct OutputSink {
    encoder: Box<dyn FrameEncoder>,
    encoding: EncodingDescriptor,
    width: u32,
    height: u32,
    fps: u32,
    frames: u64,
    state: SinkState,
}

impl OutputSink {
    /// A sink for frames of `width x height`.
    pub fn new(
        encoder: Box<dyn FrameEncoder>,
        encoding: EncodingDescriptor,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            encoder,
            encoding,
            width,
            height,
            fps: 0,
            frames: 0,
            state: SinkState::Idle,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames
    }

    pub async fn start(&mut self, fps: u32) -> NebulaResult<()> {
        if self.state != SinkState::Idle {
            return Err(NebulaError::invalid_state(format!(
                "sink start in state {:?}",
                self.state
            )));
        }
        if fps == 0 {
            return Err(NebulaError::invalid_state("sink started at 0 fps"));
        }
        self.encoder.begin(self.width, self.height, fps).await?;
        self.fps = fps;
        self.state = SinkState::Started;
        tracing::debug!(
            encoder = self.encoder.name(),
            width = self.width,
            height = self.height,
            fps,
            "Output sink started"
        );
        Ok(())
    }

    /// Hand one frame to the encoder. Frames are taken in call order.
    pub async fn push(&mut self, frame: &Frame) -> NebulaResult<()> {
        if self.state != SinkState::Started {
            return Err(NebulaError::invalid_state(format!(
                "push in sink state {:?}",
                self.state
            )));
        }
        if frame.dimensions() != (self.width, self.height) {
            return Err(NebulaError::invalid_state(format!(
                "pushed {}x{} frame into {}x{} sink",
                frame.width, frame.height, self.width, self.height
            )));
        }
        self.encoder.encode(&frame.data).await?;
        self.frames += 1;
        Ok(())
    }

    /// Finalize the stream. Resolves once the encoder has flushed everything.
    pub async fn stop(&mut self) -> NebulaResult<OutputArtifact> {
        if self.state != SinkState::Started {
            return Err(NebulaError::invalid_state(format!(
                "stop in sink state {:?}",
                self.state
            )));
        }
        // stays Started on failure so `abort` still reaches the encoder
        let bytes = self.encoder.finish().await?;
        self.state = SinkState::Stopped;

        let metadata = ArtifactMetadata {
            duration_secs: self.frames as f64 / self.fps as f64,
            size_bytes: bytes.len() as u64,
            width: self.width,
            height: self.height,
            frame_count: self.frames,
            fps: self.fps,
            container: self.encoding.container,
            codec: self.encoding.codec,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        tracing::info!(
            frames = metadata.frame_count,
            duration_secs = metadata.duration_secs,
            size_bytes = metadata.size_bytes,
            "Output finalized"
        );
        Ok(OutputArtifact { bytes, metadata })
    }

    /// Stop without finalizing. Safe to call in any state.
    pub async fn abort(&mut self) {
        if self.state == SinkState::Started {
            self.encoder.abort().await;
            tracing::debug!(frames = self.frames, "Output sink aborted");
        }
        if self.state != SinkState::Stopped {
            self.state = SinkState::Aborted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{RawStreamHeader, RawVideoEncoder};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn sink() -> OutputSink {
        OutputSink::new(
            Box::new(RawVideoEncoder::new()),
            EncodingDescriptor::parse("raw", "", 0).unwrap(),
            4,
            2,
        )
    }

    #[tokio::test]
    async fn test_push_before_start_is_invalid() {
        let mut sink = sink();
        let err = sink.push(&Frame::solid(4, 2, [0; 4])).await.unwrap_err();
        assert!(matches!(err, NebulaError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_push_after_stop_is_invalid() {
        let mut sink = sink();
        sink.start(30).await.unwrap();
        sink.push(&Frame::solid(4, 2, [9, 9, 9, 255])).await.unwrap();
        let artifact = sink.stop().await.unwrap();
        assert_eq!(artifact.metadata.frame_count, 1);

        let err = sink.push(&Frame::solid(4, 2, [0; 4])).await.unwrap_err();
        assert!(matches!(err, NebulaError::InvalidState { .. }));
        assert!(sink.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_metadata_matches_stream() {
        let mut sink = sink();
        sink.start(30).await.unwrap();
        for _ in 0..15 {
            sink.push(&Frame::solid(4, 2, [1, 2, 3, 255])).await.unwrap();
        }
        let artifact = sink.stop().await.unwrap();
        assert!((artifact.metadata.duration_secs - 0.5).abs() < 1e-9);
        assert_eq!(artifact.metadata.size_bytes, artifact.bytes.len() as u64);
        assert_eq!((artifact.metadata.width, artifact.metadata.height), (4, 2));

        let header = RawStreamHeader::decode(&artifact.bytes).unwrap();
        assert_eq!(header.frame_count, 15);
    }

    #[tokio::test]
    async fn test_wrong_size_is_rejected() {
        let mut sink = sink();
        sink.start(30).await.unwrap();
        assert!(sink.push(&Frame::solid(2, 2, [0; 4])).await.is_err());
        assert_eq!(sink.frames_pushed(), 0);
    }

    #[tokio::test]
    async fn test_abort_never_finalizes() {
        let mut sink = sink();
        sink.start(30).await.unwrap();
        sink.push(&Frame::solid(4, 2, [0; 4])).await.unwrap();
        sink.abort().await;
        assert_eq!(sink.state(), SinkState::Aborted);
        assert!(sink.stop().await.is_err());
    }

    struct UnfinishableEncoder {
        aborted: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl FrameEncoder for UnfinishableEncoder {
        fn name(&self) -> &str {
            "unfinishable"
        }

        async fn begin(&mut self, _width: u32, _height: u32, _fps: u32) -> NebulaResult<()> {
            Ok(())
        }

        async fn encode(&mut self, _rgba: &[u8]) -> NebulaResult<()> {
            Ok(())
        }

        async fn finish(&mut self) -> NebulaResult<Vec<u8>> {
            Err(NebulaError::encoder("trailer write failed"))
        }

        async fn abort(&mut self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_failed_stop_still_aborts_encoder() {
        let aborted = Arc::new(AtomicBool::new(false));
        let mut sink = OutputSink::new(
            Box::new(UnfinishableEncoder {
                aborted: Arc::clone(&aborted),
            }),
            EncodingDescriptor::parse("raw", "", 0).unwrap(),
            4,
            2,
        );
        sink.start(30).await.unwrap();
        sink.push(&Frame::solid(4, 2, [0; 4])).await.unwrap();

        assert!(sink.stop().await.is_err());
        assert_eq!(sink.state(), SinkState::Started);

        sink.abort().await;
        assert!(aborted.load(Ordering::SeqCst));
        assert_eq!(sink.state(), SinkState::Aborted);
    }
}
