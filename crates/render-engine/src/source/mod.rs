//! Media sources and the adapter that drives them.
//!
//! A [`MediaSource`] is owned by whoever supplied it; the pipeline only
//! seeks and snapshots it. [`SourceAdapter`] puts a bounded timeout around
//! every seek, because some sources never signal completion for a seek to
//! the position they are already at.

pub mod ffmpeg;
pub mod synthetic;

use std::time::Duration;

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::Frame;

pub use ffmpeg::{command_exists, probe_media, FfmpegSource, MediaInfo};
pub use synthetic::{DetachHandle, SyntheticSource};

/// Seek targets stay this far before the end so a frame is always decodable.
pub const END_GUARD_SECS: f64 = 0.01;

/// A seekable source of RGBA frames.
#[async_trait::async_trait]
pub trait MediaSource: Send {
    fn duration_secs(&self) -> f64;

    /// Native frame size.
    fn dimensions(&self) -> (u32, u32);

    /// Position the source currently reports.
    fn current_secs(&self) -> f64;

    /// Move to `secs`. Resolves once the source reports the seek finished,
    /// which may be never for a no-op seek.
    async fn seek(&mut self, secs: f64) -> NebulaResult<()>;

    /// Raw RGBA pixels at the current position, sized to `dimensions()`.
    async fn snapshot(&mut self) -> NebulaResult<Frame>;

    /// False once the underlying resource has been revoked.
    fn is_attached(&self) -> bool {
        true
    }

    /// Short label for logs.
    fn describe(&self) -> String {
        let (w, h) = self.dimensions();
        format!("{w}x{h} {:.2}s", self.duration_secs())
    }
}

/// Result of one adapter seek.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekOutcome {
    /// Clamped target that was requested.
    pub target_secs: f64,
    /// Position the source reported afterwards.
    pub landed_secs: f64,
    /// Whether the timeout fired before the source confirmed.
    pub timed_out: bool,
}

/// One source slot of a render.
pub struct SourceAdapter {
    index: usize,
    source: Box<dyn MediaSource>,
    seek_timeout: Duration,
    timeouts: u64,
}

impl SourceAdapter {
    pub fn new(index: usize, source: Box<dyn MediaSource>, seek_timeout: Duration) -> Self {
        Self {
            index,
            source,
            seek_timeout,
            timeouts: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn duration_secs(&self) -> f64 {
        self.source.duration_secs()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    /// Seeks that gave up waiting for confirmation.
    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Clamp a target into the decodable range of this source.
    pub fn clamp_target(&self, secs: f64) -> f64 {
        let last = (self.duration_secs() - END_GUARD_SECS).max(0.0);
        if secs.is_nan() {
            return 0.0;
        }
        secs.clamp(0.0, last)
    }

    /// Seek, waiting at most the configured timeout.
    ///
    /// A timeout is logged and treated as success: the caller proceeds
    /// with whatever frame the source holds. There is no retry.
    pub async fn seek_to(&mut self, secs: f64) -> NebulaResult<SeekOutcome> {
        self.ensure_attached()?;
        let target = self.clamp_target(secs);

        let timed_out = match tokio::time::timeout(self.seek_timeout, self.source.seek(target)).await
        {
            Ok(result) => {
                result.map_err(|e| self.unavailable(e))?;
                false
            }
            Err(_) => {
                self.timeouts += 1;
                let err = NebulaError::SeekTimeout {
                    index: self.index,
                    target_secs: target,
                    timeout_ms: self.seek_timeout.as_millis() as u64,
                };
                tracing::warn!(error = %err, "Seek did not confirm, continuing");
                true
            }
        };

        Ok(SeekOutcome {
            target_secs: target,
            landed_secs: self.source.current_secs(),
            timed_out,
        })
    }

    /// Snapshot the current position, checking the frame size.
    pub async fn capture_frame(&mut self) -> NebulaResult<Frame> {
        self.ensure_attached()?;
        let frame = self
            .source
            .snapshot()
            .await
            .map_err(|e| self.unavailable(e))?;

        let expected = self.dimensions();
        if frame.dimensions() != expected || frame.data.len() != Frame::byte_len(expected.0, expected.1)
        {
            return Err(NebulaError::source_unavailable(
                self.index,
                format!(
                    "snapshot is {}x{} ({} bytes), source reports {}x{}",
                    frame.width,
                    frame.height,
                    frame.data.len(),
                    expected.0,
                    expected.1
                ),
            ));
        }
        Ok(frame)
    }

    fn ensure_attached(&self) -> NebulaResult<()> {
        if self.source.is_attached() {
            Ok(())
        } else {
            Err(NebulaError::source_unavailable(self.index, "source detached"))
        }
    }

    fn unavailable(&self, err: NebulaError) -> NebulaError {
        match err {
            NebulaError::SourceUnavailable { .. } => err,
            other => NebulaError::source_unavailable(self.index, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_noop_seek_times_out_and_proceeds() {
        let source = SyntheticSource::new(16, 8, 2.0);
        let mut adapter = SourceAdapter::new(0, Box::new(source), Duration::from_millis(100));

        let started = tokio::time::Instant::now();
        let outcome = adapter.seek_to(0.0).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(adapter.timeouts(), 1);
        assert_eq!(started.elapsed(), Duration::from_millis(100));

        let frame = adapter.capture_frame().await.unwrap();
        assert_eq!(frame.dimensions(), (16, 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_confirms_within_timeout() {
        let source = SyntheticSource::new(16, 8, 2.0).with_seek_latency(Duration::from_millis(20));
        let mut adapter = SourceAdapter::new(0, Box::new(source), Duration::from_millis(100));
        let outcome = adapter.seek_to(1.0).await.unwrap();
        assert!(!outcome.timed_out);
        assert_eq!(outcome.landed_secs, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_are_clamped() {
        let source = SyntheticSource::new(16, 8, 2.0);
        let mut adapter = SourceAdapter::new(0, Box::new(source), Duration::from_millis(100));
        let outcome = adapter.seek_to(5.0).await.unwrap();
        assert!((outcome.target_secs - 1.99).abs() < 1e-9);
        assert_eq!(adapter.clamp_target(-3.0), 0.0);
    }

    #[tokio::test]
    async fn test_detached_source_is_unavailable() {
        let source = SyntheticSource::new(16, 8, 2.0);
        let detach = source.detach_handle();
        let mut adapter = SourceAdapter::new(1, Box::new(source), Duration::from_millis(100));
        detach.detach();

        let err = adapter.seek_to(1.0).await.unwrap_err();
        assert!(matches!(err, NebulaError::SourceUnavailable { index: 1, .. }));
        assert!(adapter.capture_frame().await.is_err());
    }
}
