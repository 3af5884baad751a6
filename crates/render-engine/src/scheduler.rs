//! Frame scheduler: the render control loop.
//!
//! ```text
//! Idle -> Initializing -> Ready -> Rendering -> Finalizing -> Complete
//!              |                     |   |
//!              v                     v   v
//!            Failed               Failed Cancelled
//! ```
//!
//! The loop runs on the caller's task. Between frames it yields to the
//! runtime, and it checks the cancel flag once per frame. Every exit path
//! other than `Complete` releases live effect buffers and aborts the sink
//! before the error reaches the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use nebula_common::clock::{FrameClock, ProgressThrottle};
use nebula_common::config::RenderDefaults;
use nebula_common::error::{NebulaError, NebulaResult};
use nebula_effects::{EffectInvoker, ExchangeStats, NativeEffectProcessor};
use nebula_render_model::{
    canvas_size, FilterOp, Frame, FrameSources, FrameTask, OutputArtifact, RenderRequest,
};

use crate::compositor::{Compositor, DEFAULT_BACKGROUND};
use crate::encode::FrameEncoder;
use crate::seek::{CapturedFrames, SeekCoordinator};
use crate::sink::OutputSink;
use crate::source::{MediaSource, SourceAdapter};

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    Idle,
    Initializing,
    Ready,
    Rendering,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

/// Stage reported alongside progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

/// Progress snapshot passed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderProgress {
    /// Fraction of output frames pushed, `[0, 1]`, never decreasing.
    pub progress: f64,
    pub frames_rendered: u64,
    pub total_frames: u64,
    /// Estimated seconds remaining, from elapsed wall time.
    pub eta_secs: f64,
    pub stage: RenderStage,
}

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(RenderProgress) + Send + Sync>;

/// Cloneable cancellation flag. Triggering it stops the render at the next
/// frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Tunables for one scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub seek_timeout: Duration,
    /// Progress is reported every this many frames.
    pub progress_interval: u64,
    /// Color behind transparent output pixels.
    pub background: [u8; 4],
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            seek_timeout: Duration::from_millis(100),
            progress_interval: 10,
            background: DEFAULT_BACKGROUND,
        }
    }
}

impl SchedulerConfig {
    pub fn from_defaults(defaults: &RenderDefaults) -> Self {
        Self {
            seek_timeout: Duration::from_millis(defaults.seek_timeout_ms),
            progress_interval: defaults.progress_interval_frames,
            ..Self::default()
        }
    }
}

/// Counters from the most recent render, successful or not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStats {
    pub frames_rendered: u64,
    pub seek_timeouts: u64,
    pub unsupported_fallbacks: u64,
    pub buffers: ExchangeStats,
    pub canvas: (u32, u32),
    pub max_drift_secs: f64,
}

/// Walks a render plan frame by frame.
pub struct FrameScheduler {
    config: SchedulerConfig,
    state: RenderState,
    cancel: CancelHandle,
    progress: Option<ProgressCallback>,
    last_stats: Option<RenderStats>,
}

/// Everything bound for the duration of one render.
struct RenderRun<'p, 'r> {
    coordinator: SeekCoordinator,
    invoker: EffectInvoker<'p>,
    sink: OutputSink,
    compositor: Compositor,
    filters: &'r [FilterOp],
    frames: u64,
}

impl RenderRun<'_, '_> {
    /// Capture, blend, filter, and compose one output frame.
    async fn produce(&mut self, task: &FrameTask) -> NebulaResult<Frame> {
        let captured = self.coordinator.capture(&task.sources).await?;
        let frame = match (captured, &task.sources) {
            (CapturedFrames::Single(frame), FrameSources::Single(_)) => frame,
            (
                CapturedFrames::Pair { from, to },
                FrameSources::Blended {
                    transition,
                    progress,
                    ..
                },
            ) => self
                .invoker
                .apply_transition(&from, &to, transition, *progress)?,
            _ => {
                return Err(NebulaError::invalid_state(format!(
                    "frame {} captured the wrong number of inputs",
                    task.index
                )))
            }
        };
        let frame = self.invoker.apply_chain(frame, self.filters)?;
        Ok(self.compositor.compose(frame))
    }

    fn stats(&self) -> RenderStats {
        RenderStats {
            frames_rendered: self.frames,
            seek_timeouts: self.coordinator.timeouts(),
            unsupported_fallbacks: self.invoker.fallback_count(),
            buffers: self.invoker.stats(),
            canvas: self.coordinator.canvas(),
            max_drift_secs: self.coordinator.max_drift_secs(),
        }
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl FrameScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            state: RenderState::Idle,
            cancel: CancelHandle::new(),
            progress: None,
            last_stats: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// A handle that cancels whichever render this scheduler is running.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn last_stats(&self) -> Option<RenderStats> {
        self.last_stats
    }

    /// Run one render to completion.
    ///
    /// `sources` are bound to plan source indices by position. The processor
    /// is initialized here if it was not already; it stays owned by the
    /// caller, as do the sources until the call returns.
    pub async fn render(
        &mut self,
        processor: &mut dyn NativeEffectProcessor,
        request: &RenderRequest,
        sources: Vec<Box<dyn MediaSource>>,
        encoder: Box<dyn FrameEncoder>,
    ) -> NebulaResult<OutputArtifact> {
        if !matches!(self.state, RenderState::Idle) && !self.state.is_terminal() {
            return Err(NebulaError::invalid_state(format!(
                "render started while {:?}",
                self.state
            )));
        }
        self.last_stats = None;
        self.set_state(RenderState::Initializing);
        let total = request.plan.total_frames();
        self.report(RenderStage::Preparing, 0, total, None);

        if let Err(err) = self.check_inputs(request, &sources) {
            return Err(self.fail_early(err, total));
        }

        if let Err(err) = processor.init().await {
            let err = match err {
                NebulaError::Initialization { .. } => err,
                other => NebulaError::initialization(other.to_string()),
            };
            return Err(self.fail_early(err, total));
        }

        let dims: Vec<(u32, u32)> = sources.iter().map(|s| s.dimensions()).collect();
        let (width, height) = canvas_size(&dims, request.max_width, request.max_height);
        tracing::info!(
            frames = total,
            fps = request.fps(),
            width,
            height,
            sources = sources.len(),
            filters = request.plan.filters.len(),
            "Render prepared"
        );

        let adapters = sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| {
                tracing::debug!(index = i, source = %source.describe(), "Binding source");
                SourceAdapter::new(i, source, self.config.seek_timeout)
            })
            .collect();

        let invoker = match EffectInvoker::new(processor, width, height) {
            Ok(invoker) => invoker,
            Err(err) => return Err(self.fail_early(err, total)),
        };

        let mut run = RenderRun {
            coordinator: SeekCoordinator::new(
                adapters,
                (width, height),
                FrameClock::new(request.fps()),
            ),
            invoker,
            sink: OutputSink::new(encoder, request.encoding, width, height),
            compositor: Compositor::new(request.watermark.clone(), self.config.background),
            filters: &request.plan.filters,
            frames: 0,
        };
        self.set_state(RenderState::Ready);

        let started = Instant::now();
        let result = self.drive(&mut run, request, started).await;

        match result {
            Ok(artifact) => {
                let stats = run.stats();
                self.last_stats = Some(stats);
                self.set_state(RenderState::Complete);
                self.report(RenderStage::Complete, total, total, Some(started));
                tracing::info!(
                    frames = stats.frames_rendered,
                    seek_timeouts = stats.seek_timeouts,
                    fallbacks = stats.unsupported_fallbacks,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Render complete"
                );
                Ok(artifact)
            }
            Err(err) => {
                let leaked = run.invoker.release_all();
                if leaked > 0 {
                    tracing::warn!(leaked, "Released effect buffers left live by the failed frame");
                }
                run.sink.abort().await;
                self.last_stats = Some(run.stats());

                if matches!(err, NebulaError::Cancelled) {
                    self.set_state(RenderState::Cancelled);
                    self.report(RenderStage::Cancelled, run.frames, total, Some(started));
                    tracing::info!(frames = run.frames, total, "Render cancelled");
                } else {
                    self.set_state(RenderState::Failed);
                    self.report(RenderStage::Failed, run.frames, total, Some(started));
                    tracing::error!(error = %err, frames = run.frames, "Render failed");
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &mut self,
        run: &mut RenderRun<'_, '_>,
        request: &RenderRequest,
        started: Instant,
    ) -> NebulaResult<OutputArtifact> {
        let total = request.plan.total_frames();
        run.sink.start(request.fps()).await?;
        self.set_state(RenderState::Rendering);

        let mut throttle = ProgressThrottle::new(self.config.progress_interval);
        let mut last_secs: Option<f64> = None;

        for task in request.plan.frame_tasks() {
            if self.cancel.is_cancelled() {
                return Err(NebulaError::Cancelled);
            }
            if let Some(prev) = last_secs {
                if task.output_secs <= prev {
                    return Err(NebulaError::invalid_state(format!(
                        "frame {} at {:.6}s does not follow {:.6}s",
                        task.index, task.output_secs, prev
                    )));
                }
            }
            last_secs = Some(task.output_secs);

            let frame = run.produce(&task).await?;
            run.sink.push(&frame).await?;
            run.frames += 1;
            tracing::trace!(index = task.index, phase = task.phase_index, "Frame pushed");

            if throttle.should_report(run.frames, total) {
                self.report(RenderStage::Rendering, run.frames, total, Some(started));
            }
            tokio::task::yield_now().await;
        }

        self.set_state(RenderState::Finalizing);
        self.report(RenderStage::Finalizing, run.frames, total, Some(started));
        run.sink.stop().await
    }

    fn check_inputs(
        &self,
        request: &RenderRequest,
        sources: &[Box<dyn MediaSource>],
    ) -> NebulaResult<()> {
        request.validate()?;
        let needed = request.plan.source_count();
        if sources.len() < needed {
            return Err(NebulaError::source_unavailable(
                sources.len(),
                format!("plan reads {needed} sources, {} supplied", sources.len()),
            ));
        }
        if let Some(index) = sources.iter().position(|s| !s.is_attached()) {
            return Err(NebulaError::source_unavailable(index, "source detached"));
        }
        Ok(())
    }

    fn fail_early(&mut self, err: NebulaError, total: u64) -> NebulaError {
        self.set_state(RenderState::Failed);
        self.report(RenderStage::Failed, 0, total, None);
        tracing::error!(error = %err, "Render could not start");
        err
    }

    fn set_state(&mut self, state: RenderState) {
        tracing::debug!(from = ?self.state, to = ?state, "Render state");
        self.state = state;
        // a cancel that lands after the last frame check belongs to the render that just ended
        if state.is_terminal() && self.cancel.is_cancelled() {
            tracing::debug!(?state, "Clearing cancel request at render end");
            self.cancel.reset();
        }
    }

    fn report(&self, stage: RenderStage, done: u64, total: u64, started: Option<Instant>) {
        let Some(callback) = &self.progress else {
            return;
        };
        let progress = if stage == RenderStage::Complete {
            1.0
        } else if total == 0 {
            0.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0)
        };
        let elapsed = started.map(|s| s.elapsed().as_secs_f64()).unwrap_or(0.0);
        let eta_secs = if progress > 0.0 {
            (elapsed / progress) - elapsed
        } else {
            0.0
        }
        .max(0.0);

        callback(RenderProgress {
            progress,
            frames_rendered: done,
            total_frames: total,
            eta_secs,
            stage,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.cancel();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_config_from_defaults() {
        let defaults = RenderDefaults::default();
        let config = SchedulerConfig::from_defaults(&defaults);
        assert_eq!(config.seek_timeout, Duration::from_millis(defaults.seek_timeout_ms));
        assert_eq!(config.progress_interval, defaults.progress_interval_frames);
    }

    #[test]
    fn test_terminal_states() {
        assert!(RenderState::Complete.is_terminal());
        assert!(RenderState::Cancelled.is_terminal());
        assert!(!RenderState::Rendering.is_terminal());
        assert!(!RenderState::Idle.is_terminal());
    }
}
