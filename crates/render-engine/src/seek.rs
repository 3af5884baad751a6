//! Seek coordination across the bound sources.
//!
//! Every output frame starts here: seek each needed source to its sample
//! time, snapshot it, and scale it onto the canvas. When a frame blends two
//! different sources both seeks run concurrently and the frame waits for
//! the slower one.

use nebula_common::clock::{DriftMeasurement, FrameClock};
use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::{Frame, FrameSources, SourceTime};

use crate::source::SourceAdapter;

/// Canvas-sized inputs for one output frame.
#[derive(Debug)]
pub enum CapturedFrames {
    Single(Frame),
    Pair { from: Frame, to: Frame },
}

/// Owns the adapters of a render and samples them frame by frame.
pub struct SeekCoordinator {
    adapters: Vec<SourceAdapter>,
    canvas: (u32, u32),
    clock: FrameClock,
    max_drift_secs: f64,
}

impl SeekCoordinator {
    pub fn new(adapters: Vec<SourceAdapter>, canvas: (u32, u32), clock: FrameClock) -> Self {
        Self {
            adapters,
            canvas,
            clock,
            max_drift_secs: 0.0,
        }
    }

    pub fn canvas(&self) -> (u32, u32) {
        self.canvas
    }

    pub fn source_count(&self) -> usize {
        self.adapters.len()
    }

    /// Total seek timeouts across all sources.
    pub fn timeouts(&self) -> u64 {
        self.adapters.iter().map(SourceAdapter::timeouts).sum()
    }

    /// Largest absolute gap between a seek target and where a source landed.
    pub fn max_drift_secs(&self) -> f64 {
        self.max_drift_secs
    }

    /// Gather the inputs a frame task names.
    pub async fn capture(&mut self, sources: &FrameSources) -> NebulaResult<CapturedFrames> {
        match sources {
            FrameSources::Single(at) => Ok(CapturedFrames::Single(self.capture_single(*at).await?)),
            FrameSources::Blended { from, to, .. } => {
                let (from, to) = self.capture_pair(*from, *to).await?;
                Ok(CapturedFrames::Pair { from, to })
            }
        }
    }

    pub async fn capture_single(&mut self, at: SourceTime) -> NebulaResult<Frame> {
        let (canvas, clock) = (self.canvas, self.clock);
        let adapter = self.adapter_mut(at.source)?;
        let (frame, drift) = sample(adapter, at, canvas, clock).await?;
        self.note_drift(drift);
        Ok(frame)
    }

    /// Capture two sample points. Distinct sources seek concurrently; two
    /// points on the same source are taken in order.
    pub async fn capture_pair(
        &mut self,
        from: SourceTime,
        to: SourceTime,
    ) -> NebulaResult<(Frame, Frame)> {
        if from.source == to.source {
            let a = self.capture_single(from).await?;
            let b = self.capture_single(to).await?;
            return Ok((a, b));
        }

        let (canvas, clock) = (self.canvas, self.clock);
        let (a, b) = pair_mut(&mut self.adapters, from.source, to.source)?;
        let (ra, rb) = tokio::join!(sample(a, from, canvas, clock), sample(b, to, canvas, clock));
        let (fa, da) = ra?;
        let (fb, db) = rb?;
        self.note_drift(da);
        self.note_drift(db);
        Ok((fa, fb))
    }

    fn adapter_mut(&mut self, index: usize) -> NebulaResult<&mut SourceAdapter> {
        self.adapters
            .get_mut(index)
            .ok_or_else(|| NebulaError::source_unavailable(index, "no source bound to this slot"))
    }

    fn note_drift(&mut self, drift: f64) {
        self.max_drift_secs = self.max_drift_secs.max(drift.abs());
    }
}

async fn sample(
    adapter: &mut SourceAdapter,
    at: SourceTime,
    canvas: (u32, u32),
    clock: FrameClock,
) -> NebulaResult<(Frame, f64)> {
    let outcome = adapter.seek_to(at.secs).await?;
    let drift = DriftMeasurement {
        target_secs: outcome.target_secs,
        landed_secs: outcome.landed_secs,
    };
    if drift.exceeds_half_frame(&clock) {
        tracing::debug!(
            source = adapter.index(),
            target_secs = drift.target_secs,
            landed_secs = drift.landed_secs,
            drift_ms = drift.drift_ms(),
            timed_out = outcome.timed_out,
            "Source landed off target"
        );
    }

    let frame = adapter.capture_frame().await?;
    let frame = if frame.dimensions() == canvas {
        frame
    } else {
        frame.scaled_to(canvas.0, canvas.1)
    };
    Ok((frame, drift.drift_secs()))
}

fn pair_mut(
    adapters: &mut [SourceAdapter],
    i: usize,
    j: usize,
) -> NebulaResult<(&mut SourceAdapter, &mut SourceAdapter)> {
    let len = adapters.len();
    for index in [i, j] {
        if index >= len {
            return Err(NebulaError::source_unavailable(
                index,
                "no source bound to this slot",
            ));
        }
    }
    if i < j {
        let (left, right) = adapters.split_at_mut(j);
        Ok((&mut left[i], &mut right[0]))
    } else {
        let (left, right) = adapters.split_at_mut(i);
        Ok((&mut right[0], &mut left[j]))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::source::SyntheticSource;

    fn coordinator(latencies: &[u64]) -> SeekCoordinator {
        let adapters = latencies
            .iter()
            .enumerate()
            .map(|(i, ms)| {
                let source = SyntheticSource::new(8, 4, 10.0)
                    .with_base(i as u8 * 100, 0)
                    .with_seek_latency(Duration::from_millis(*ms));
                SourceAdapter::new(i, Box::new(source), Duration::from_secs(1))
            })
            .collect();
        SeekCoordinator::new(adapters, (16, 8), FrameClock::new(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pair_seeks_overlap() {
        let mut coord = coordinator(&[50, 200]);
        let started = tokio::time::Instant::now();
        let (a, b) = coord
            .capture_pair(
                SourceTime { source: 0, secs: 1.0 },
                SourceTime { source: 1, secs: 2.0 },
            )
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(200));
        assert_eq!(a.pixel(0, 0)[0], 0);
        assert_eq!(b.pixel(0, 0)[0], 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reversed_pair_keeps_roles() {
        let mut coord = coordinator(&[10, 10]);
        let (from, to) = coord
            .capture_pair(
                SourceTime { source: 1, secs: 1.0 },
                SourceTime { source: 0, secs: 1.0 },
            )
            .await
            .unwrap();
        assert_eq!(from.pixel(0, 0)[0], 100);
        assert_eq!(to.pixel(0, 0)[0], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_source_pair_is_sequential() {
        let mut coord = coordinator(&[50]);
        let started = tokio::time::Instant::now();
        let (a, b) = coord
            .capture_pair(
                SourceTime { source: 0, secs: 1.0 },
                SourceTime { source: 0, secs: 2.0 },
            )
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(a.pixel(0, 0)[2], SyntheticSource::time_tag(1.0));
        assert_eq!(b.pixel(0, 0)[2], SyntheticSource::time_tag(2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_scaled_to_canvas() {
        let mut coord = coordinator(&[0]);
        let frame = coord
            .capture_single(SourceTime { source: 0, secs: 0.5 })
            .await
            .unwrap();
        assert_eq!(frame.dimensions(), (16, 8));
        assert_eq!(coord.timeouts(), 0);
    }

    #[tokio::test]
    async fn test_unbound_slot_is_unavailable() {
        let mut coord = coordinator(&[0]);
        let err = coord
            .capture_single(SourceTime { source: 3, secs: 0.5 })
            .await
            .unwrap_err();
        assert!(matches!(err, NebulaError::SourceUnavailable { index: 3, .. }));
    }
}
