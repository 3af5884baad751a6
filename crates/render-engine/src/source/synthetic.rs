//! Deterministic in-memory source for tests and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::Frame;

use super::MediaSource;

/// Revokes a [`SyntheticSource`] from outside the pipeline.
#[derive(Debug, Clone)]
pub struct DetachHandle(Arc<AtomicBool>);

impl DetachHandle {
    pub fn detach(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Generates frames whose pixels encode the sampled timestamp.
///
/// Red and green carry the base color, blue carries [`SyntheticSource::time_tag`]
/// of the position, and alpha is opaque. Seeking to the current position
/// never completes, like a media element that only fires `seeked` on change.
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    duration_secs: f64,
    position: f64,
    base: [u8; 2],
    seek_latency: Option<Duration>,
    attached: Arc<AtomicBool>,
    snapshots: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, duration_secs: f64) -> Self {
        Self {
            width,
            height,
            duration_secs,
            position: 0.0,
            base: [128, 64],
            seek_latency: None,
            attached: Arc::new(AtomicBool::new(true)),
            snapshots: 0,
        }
    }

    pub fn with_base(mut self, red: u8, green: u8) -> Self {
        self.base = [red, green];
        self
    }

    /// Every effective seek sleeps this long before confirming.
    pub fn with_seek_latency(mut self, latency: Duration) -> Self {
        self.seek_latency = Some(latency);
        self
    }

    pub fn detach_handle(&self) -> DetachHandle {
        DetachHandle(Arc::clone(&self.attached))
    }

    pub fn snapshot_count(&self) -> u64 {
        self.snapshots
    }

    /// Blue channel value a frame sampled at `secs` carries.
    pub fn time_tag(secs: f64) -> u8 {
        ((secs * 1000.0).round() as u64 % 256) as u8
    }
}

#[async_trait::async_trait]
impl MediaSource for SyntheticSource {
    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn current_secs(&self) -> f64 {
        self.position
    }

    async fn seek(&mut self, secs: f64) -> NebulaResult<()> {
        if (secs - self.position).abs() < 1e-9 {
            std::future::pending::<()>().await;
        }
        if let Some(latency) = self.seek_latency {
            tokio::time::sleep(latency).await;
        }
        self.position = secs;
        Ok(())
    }

    async fn snapshot(&mut self) -> NebulaResult<Frame> {
        if !self.is_attached() {
            return Err(NebulaError::invalid_state("snapshot of detached source"));
        }
        self.snapshots += 1;
        let tag = Self::time_tag(self.position);
        Ok(Frame::solid(
            self.width,
            self.height,
            [self.base[0], self.base[1], tag, 255],
        ))
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}
