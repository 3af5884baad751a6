//! Render plans: the ordered phases a render walks frame by frame.
//!
//! A plan is built once by the caller and is read-only to the pipeline.
//! Phase frame counts are fixed at construction, so the total output frame
//! count and every per-frame source timestamp are known before rendering.

use crate::effect::{FilterOp, TransitionKind};
use nebula_common::clock::FrameClock;
use nebula_common::error::{NebulaError, NebulaResult};
use serde::{Deserialize, Serialize};

/// Largest number of distinct sources a plan may reference.
pub const MAX_SOURCES: usize = 2;

/// Shortest trim the planner accepts.
pub const MIN_TRIM_SECS: f64 = 0.1;

/// Slack allowed when comparing plan timestamps.
const TIME_EPSILON: f64 = 1e-6;

/// A time range on one source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub source: usize,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl SourceSpan {
    pub fn new(source: usize, start_secs: f64, end_secs: f64) -> Self {
        Self {
            source,
            start_secs,
            end_secs,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    fn validate(&self) -> NebulaResult<()> {
        if self.source >= MAX_SOURCES {
            return Err(NebulaError::plan(format!(
                "source index {} exceeds the {MAX_SOURCES}-source limit",
                self.source
            )));
        }
        if !self.start_secs.is_finite() || !self.end_secs.is_finite() {
            return Err(NebulaError::plan("span bounds must be finite"));
        }
        if self.start_secs < 0.0 || self.end_secs <= self.start_secs {
            return Err(NebulaError::plan(format!(
                "invalid span [{:.3}, {:.3}) on source {}",
                self.start_secs, self.end_secs, self.source
            )));
        }
        Ok(())
    }
}

/// Which transition to use between two sources, and for how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub kind: TransitionKind,
    pub duration_secs: f64,
}

impl TransitionSpec {
    pub fn new(kind: TransitionKind, duration_secs: f64) -> Self {
        Self {
            kind,
            duration_secs,
        }
    }
}

/// What a phase draws from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseKind {
    Single {
        span: SourceSpan,
    },
    Blended {
        from: SourceSpan,
        to: SourceSpan,
        transition: TransitionSpec,
    },
}

impl PhaseKind {
    fn validate(&self) -> NebulaResult<()> {
        match self {
            PhaseKind::Single { span } => span.validate(),
            PhaseKind::Blended {
                from,
                to,
                transition,
            } => {
                from.validate()?;
                to.validate()?;
                if !transition.duration_secs.is_finite() || transition.duration_secs <= 0.0 {
                    return Err(NebulaError::plan(
                        "blended phase needs a positive transition duration",
                    ));
                }
                Ok(())
            }
        }
    }

    fn frame_count(&self, clock: &FrameClock) -> u64 {
        match self {
            PhaseKind::Single { span } => clock.frames_rounded(span.duration_secs()),
            PhaseKind::Blended { transition, .. } => {
                clock.frames_covering(transition.duration_secs)
            }
        }
    }
}

/// One contiguous stretch of output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub kind: PhaseKind,
    pub frame_count: u64,
    /// Output timestamp of this phase's first frame.
    pub output_start_secs: f64,
}

impl Phase {
    /// Transition progress for frame `i` of a blended phase.
    ///
    /// Evenly spaced from 0 to 1 inclusive. A one-frame blend shows the
    /// finished transition.
    pub fn progress_at(&self, i: u64) -> f32 {
        if self.frame_count <= 1 {
            return 1.0;
        }
        (i as f64 / (self.frame_count - 1) as f64) as f32
    }

    /// All progress values of this phase, in frame order.
    pub fn progress_values(&self) -> Vec<f32> {
        (0..self.frame_count).map(|i| self.progress_at(i)).collect()
    }

    fn task(&self, phase_index: usize, first_index: u64, i: u64, clock: FrameClock) -> FrameTask {
        // sources advance with the output clock; only the blend weight ramps
        let at = |span: &SourceSpan| SourceTime {
            source: span.source,
            secs: (span.start_secs + clock.time_of(i)).min(span.end_secs),
        };
        let sources = match &self.kind {
            PhaseKind::Single { span } => FrameSources::Single(at(span)),
            PhaseKind::Blended {
                from,
                to,
                transition,
            } => FrameSources::Blended {
                from: at(from),
                to: at(to),
                transition: transition.kind.clone(),
                progress: self.progress_at(i),
            },
        };

        FrameTask {
            index: first_index + i,
            output_secs: self.output_start_secs + clock.time_of(i),
            phase_index,
            sources,
        }
    }
}

/// A source and the timestamp to sample it at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceTime {
    pub source: usize,
    pub secs: f64,
}

/// The inputs of one output frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSources {
    Single(SourceTime),
    Blended {
        from: SourceTime,
        to: SourceTime,
        transition: TransitionKind,
        progress: f32,
    },
}

/// Everything the scheduler needs to produce one output frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTask {
    /// Output frame index, from 0.
    pub index: u64,
    pub output_secs: f64,
    pub phase_index: usize,
    pub sources: FrameSources,
}

/// An ordered list of phases plus the filters applied to every output frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPlan {
    pub fps: u32,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub filters: Vec<FilterOp>,
}

impl RenderPlan {
    /// Build a plan from phase kinds, computing frame counts and output offsets.
    ///
    /// Single phases get `round(duration * fps)` frames and blended phases
    /// get `ceil(transition * fps)`. A phase that would produce no frames is
    /// rejected.
    pub fn from_phases(fps: u32, kinds: Vec<PhaseKind>) -> NebulaResult<Self> {
        if fps == 0 {
            return Err(NebulaError::plan("frame rate must be positive"));
        }
        if kinds.is_empty() {
            return Err(NebulaError::plan("plan has no phases"));
        }

        let clock = FrameClock::new(fps);
        let mut phases = Vec::with_capacity(kinds.len());
        let mut frames_before = 0u64;
        for kind in kinds {
            kind.validate()?;
            let frame_count = kind.frame_count(&clock);
            if frame_count == 0 {
                return Err(NebulaError::plan(format!(
                    "phase {} is shorter than one frame at {fps} fps",
                    phases.len()
                )));
            }
            phases.push(Phase {
                kind,
                frame_count,
                output_start_secs: clock.time_of(frames_before),
            });
            frames_before += frame_count;
        }

        let plan = Self {
            fps,
            phases,
            filters: Vec::new(),
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Cut `[start_secs, end_secs)` out of one source.
    pub fn trim(
        source: usize,
        source_duration: f64,
        start_secs: f64,
        end_secs: f64,
        fps: u32,
    ) -> NebulaResult<Self> {
        if !(start_secs.is_finite() && end_secs.is_finite()) {
            return Err(NebulaError::plan("trim bounds must be finite"));
        }
        if start_secs < 0.0 || end_secs <= start_secs {
            return Err(NebulaError::plan(format!(
                "trim start {start_secs:.3}s must be before end {end_secs:.3}s"
            )));
        }
        if end_secs > source_duration + TIME_EPSILON {
            return Err(NebulaError::plan(format!(
                "trim end {end_secs:.3}s is past the source duration {source_duration:.3}s"
            )));
        }
        if end_secs - start_secs < MIN_TRIM_SECS - TIME_EPSILON {
            return Err(NebulaError::plan(format!(
                "trim must be at least {MIN_TRIM_SECS}s long"
            )));
        }

        Self::from_phases(
            fps,
            vec![PhaseKind::Single {
                span: SourceSpan::new(source, start_secs, end_secs.min(source_duration)),
            }],
        )
    }

    /// The whole of one source.
    pub fn full(source: usize, source_duration: f64, fps: u32) -> NebulaResult<Self> {
        Self::trim(source, source_duration, 0.0, source_duration, fps)
    }

    /// Join source 0 (`first_duration`) and source 1 (`second_duration`)
    /// with an overlapping transition.
    ///
    /// The last `D` seconds of the first clip blend into the first `D`
    /// seconds of the second. A zero-length transition is a hard cut.
    pub fn join(
        first_duration: f64,
        second_duration: f64,
        transition: TransitionSpec,
        fps: u32,
    ) -> NebulaResult<Self> {
        let d = transition.duration_secs;
        if !d.is_finite() || d < 0.0 {
            return Err(NebulaError::plan("transition duration must be non-negative"));
        }
        if d > first_duration + TIME_EPSILON || d > second_duration + TIME_EPSILON {
            return Err(NebulaError::plan(format!(
                "transition of {d:.3}s is longer than one of the clips ({first_duration:.3}s, {second_duration:.3}s)"
            )));
        }

        let clock = FrameClock::new(fps);
        let mut kinds = Vec::with_capacity(3);

        let pre = SourceSpan::new(0, 0.0, first_duration - d);
        if pre.duration_secs() > 0.0 && clock.frames_rounded(pre.duration_secs()) > 0 {
            kinds.push(PhaseKind::Single { span: pre });
        }

        if d > 0.0 {
            kinds.push(PhaseKind::Blended {
                from: SourceSpan::new(0, first_duration - d, first_duration),
                to: SourceSpan::new(1, 0.0, d),
                transition,
            });
        }

        let post = SourceSpan::new(1, d, second_duration);
        if post.duration_secs() > 0.0 && clock.frames_rounded(post.duration_secs()) > 0 {
            kinds.push(PhaseKind::Single { span: post });
        }

        Self::from_phases(fps, kinds)
    }

    /// Apply `filters`, in order, to every output frame.
    pub fn with_filters(mut self, filters: Vec<FilterOp>) -> Self {
        self.filters = filters;
        self
    }

    /// Check the structural invariants: non-empty phases, contiguous output
    /// offsets, bounded source count.
    pub fn validate(&self) -> NebulaResult<()> {
        if self.fps == 0 {
            return Err(NebulaError::plan("frame rate must be positive"));
        }
        if self.phases.is_empty() {
            return Err(NebulaError::plan("plan has no phases"));
        }
        let clock = FrameClock::new(self.fps);
        let mut frames_before = 0u64;
        for (i, phase) in self.phases.iter().enumerate() {
            phase.kind.validate()?;
            if phase.frame_count == 0 {
                return Err(NebulaError::plan(format!("phase {i} has no frames")));
            }
            let expected = clock.time_of(frames_before);
            if (phase.output_start_secs - expected).abs() > TIME_EPSILON {
                return Err(NebulaError::plan(format!(
                    "phase {i} starts at {:.3}s but the previous phase ends at {expected:.3}s",
                    phase.output_start_secs
                )));
            }
            frames_before += phase.frame_count;
        }
        Ok(())
    }

    pub fn total_frames(&self) -> u64 {
        self.phases.iter().map(|p| p.frame_count).sum()
    }

    /// Output duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        FrameClock::new(self.fps).time_of(self.total_frames())
    }

    /// Number of source slots the plan reads from.
    pub fn source_count(&self) -> usize {
        self.phases
            .iter()
            .flat_map(|p| match &p.kind {
                PhaseKind::Single { span } => vec![span.source],
                PhaseKind::Blended { from, to, .. } => vec![from.source, to.source],
            })
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Every output frame, in output-time order.
    pub fn frame_tasks(&self) -> impl Iterator<Item = FrameTask> + '_ {
        let clock = FrameClock::new(self.fps);
        self.phases
            .iter()
            .enumerate()
            .scan(0u64, |first_index, (phase_index, phase)| {
                let start = *first_index;
                *first_index += phase.frame_count;
                Some((phase_index, phase, start))
            })
            .flat_map(move |(phase_index, phase, start)| {
                (0..phase.frame_count).map(move |i| phase.task(phase_index, start, i, clock))
            })
    }
}
