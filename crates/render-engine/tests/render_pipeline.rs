use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_effects::CpuEffectProcessor;
use nebula_render_engine::encode::{FrameEncoder, RawStreamHeader, RawVideoEncoder};
use nebula_render_engine::source::{MediaSource, SyntheticSource};
use nebula_render_engine::{
    FrameScheduler, RenderProgress, RenderStage, RenderState, SchedulerConfig,
};
use nebula_render_model::{
    EncodingDescriptor, FilterOp, Frame, RenderPlan, RenderRequest, TransitionKind,
    TransitionSpec, Watermark,
};

const W: u32 = 32;
const H: u32 = 18;
const ARENA: usize = 1 << 20;

fn raw() -> EncodingDescriptor {
    EncodingDescriptor::parse("raw", "", 0).unwrap()
}

fn clip(duration: f64, red: u8) -> Box<dyn MediaSource> {
    Box::new(SyntheticSource::new(W, H, duration).with_base(red, 50))
}

fn raw_encoder() -> Box<dyn FrameEncoder> {
    Box::new(RawVideoEncoder::new())
}

fn first_pixel(bytes: &[u8], index: u64) -> [u8; 4] {
    let header = RawStreamHeader::decode(bytes).unwrap();
    let frame = header.frame(bytes, index).unwrap();
    [frame[0], frame[1], frame[2], frame[3]]
}

fn grade() -> FilterOp {
    FilterOp::parse("colorGrade", &serde_json::json!({ "brightness": 0.1 })).unwrap()
}

/// Encoder that records calls and can fail after a number of frames.
#[derive(Clone, Default)]
struct ProbeEncoder {
    begun: Arc<AtomicU64>,
    encoded: Arc<AtomicU64>,
    aborted: Arc<AtomicBool>,
    fail_after: Option<u64>,
    fail_finish: bool,
}

#[async_trait::async_trait]
impl FrameEncoder for ProbeEncoder {
    fn name(&self) -> &str {
        "probe"
    }

    async fn begin(&mut self, _width: u32, _height: u32, _fps: u32) -> NebulaResult<()> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn encode(&mut self, _rgba: &[u8]) -> NebulaResult<()> {
        let n = self.encoded.fetch_add(1, Ordering::SeqCst);
        match self.fail_after {
            Some(limit) if n >= limit => Err(NebulaError::encoder("pipe closed")),
            _ => Ok(()),
        }
    }

    async fn finish(&mut self) -> NebulaResult<Vec<u8>> {
        if self.fail_finish {
            return Err(NebulaError::encoder("muxer rejected the stream"));
        }
        Ok(Vec::new())
    }

    async fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_trim_renders_exact_frame_count() {
    let plan = RenderPlan::trim(0, 10.0, 2.0, 5.0, 30).unwrap();
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);
    let mut scheduler = FrameScheduler::default();

    let artifact = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 200)], raw_encoder())
        .await
        .unwrap();

    assert_eq!(scheduler.state(), RenderState::Complete);
    assert_eq!(artifact.metadata.frame_count, 90);
    assert!((artifact.metadata.duration_secs - 3.0).abs() <= 1.0 / 30.0);
    assert_eq!((artifact.metadata.width, artifact.metadata.height), (W, H));

    let header = RawStreamHeader::decode(&artifact.bytes).unwrap();
    assert_eq!(header.frame_count, 90);
    for k in [0u64, 10, 89] {
        let expected = SyntheticSource::time_tag(2.0 + k as f64 / 30.0);
        assert_eq!(first_pixel(&artifact.bytes, k)[2], expected, "frame {k}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_join_blends_two_sources() {
    let plan = RenderPlan::join(
        5.0,
        5.0,
        TransitionSpec::new(TransitionKind::Crossfade, 1.0),
        30,
    )
    .unwrap();
    let frame_counts: Vec<u64> = plan.phases.iter().map(|p| p.frame_count).collect();
    assert_eq!(frame_counts, vec![120, 30, 120]);

    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);
    let mut scheduler = FrameScheduler::default();

    let artifact = scheduler
        .render(
            &mut processor,
            &request,
            vec![clip(5.0, 200), clip(5.0, 10)],
            raw_encoder(),
        )
        .await
        .unwrap();

    assert_eq!(artifact.metadata.frame_count, 270);
    assert_eq!(first_pixel(&artifact.bytes, 0)[0], 200);
    assert_eq!(first_pixel(&artifact.bytes, 120)[0], 200);
    assert_eq!(first_pixel(&artifact.bytes, 149)[0], 10);
    // the second clip keeps advancing one frame per output frame across the cut
    assert_eq!(
        first_pixel(&artifact.bytes, 149)[2],
        SyntheticSource::time_tag(29.0 / 30.0)
    );
    assert_eq!(
        first_pixel(&artifact.bytes, 150)[2],
        SyntheticSource::time_tag(1.0)
    );
    assert_eq!(first_pixel(&artifact.bytes, 269)[0], 10);
    let mid = first_pixel(&artifact.bytes, 135)[0];
    assert!(mid > 10 && mid < 200, "mid-blend red {mid}");

    let stats = scheduler.last_stats().unwrap();
    assert_eq!(stats.buffers.allocations, 60);
    assert_eq!(stats.buffers.adoptions, 30);
    assert_eq!(stats.buffers.frees, 90);
    assert!(stats.buffers.is_balanced());
    // Only the first seek on each clip targets 0s, where it is already parked.
    assert_eq!(stats.seek_timeouts, 2);
    assert_eq!(processor.live_allocations(), 0);
}

#[tokio::test]
async fn test_cancel_releases_buffers_and_fresh_render_succeeds() {
    let plan = RenderPlan::trim(0, 10.0, 2.0, 5.0, 30)
        .unwrap()
        .with_filters(vec![grade()]);
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);

    let scheduler = FrameScheduler::default();
    let cancel = scheduler.cancel_handle();
    let fired = Arc::new(AtomicBool::new(false));
    let fired_cb = Arc::clone(&fired);
    let mut scheduler = scheduler.with_progress(Box::new(move |p: RenderProgress| {
        if p.frames_rendered >= 30 && !fired_cb.swap(true, Ordering::SeqCst) {
            cancel.cancel();
        }
    }));

    let err = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 200)], raw_encoder())
        .await
        .unwrap_err();
    assert!(matches!(err, NebulaError::Cancelled));
    assert_eq!(scheduler.state(), RenderState::Cancelled);

    let stats = scheduler.last_stats().unwrap();
    assert_eq!(stats.frames_rendered, 30);
    assert!(stats.buffers.is_balanced());
    assert_eq!(processor.live_allocations(), 0);
    assert_eq!(processor.malloc_count(), processor.free_count());

    let artifact = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 200)], raw_encoder())
        .await
        .unwrap();
    assert_eq!(artifact.metadata.frame_count, 90);
    assert_eq!(scheduler.state(), RenderState::Complete);
    assert_eq!(processor.live_allocations(), 0);
}

#[tokio::test]
async fn test_cancel_after_last_frame_does_not_leak_into_next_render() {
    let plan = RenderPlan::trim(0, 10.0, 1.0, 2.0, 30).unwrap();
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);

    let scheduler = FrameScheduler::default();
    let cancel = scheduler.cancel_handle();
    let fired = Arc::new(AtomicBool::new(false));
    let fired_cb = Arc::clone(&fired);
    let mut scheduler = scheduler.with_progress(Box::new(move |p: RenderProgress| {
        if p.stage == RenderStage::Rendering
            && p.frames_rendered == p.total_frames
            && !fired_cb.swap(true, Ordering::SeqCst)
        {
            cancel.cancel();
        }
    }));

    let first = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 200)], raw_encoder())
        .await
        .unwrap();
    assert_eq!(first.metadata.frame_count, 30);
    assert!(fired.load(Ordering::SeqCst));
    assert_eq!(scheduler.state(), RenderState::Complete);
    assert!(!scheduler.cancel_handle().is_cancelled());

    let second = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 200)], raw_encoder())
        .await
        .unwrap();
    assert_eq!(second.metadata.frame_count, 30);
    assert_eq!(scheduler.state(), RenderState::Complete);
}

#[tokio::test]
async fn test_failed_finalize_aborts_encoder() {
    let plan = RenderPlan::trim(0, 10.0, 1.0, 1.5, 30).unwrap();
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);
    let encoder = ProbeEncoder {
        fail_finish: true,
        ..ProbeEncoder::default()
    };
    let aborted = Arc::clone(&encoder.aborted);
    let encoded = Arc::clone(&encoder.encoded);

    let mut scheduler = FrameScheduler::default();
    let err = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 200)], Box::new(encoder))
        .await
        .unwrap_err();

    assert!(matches!(err, NebulaError::Encoder { .. }));
    assert_eq!(scheduler.state(), RenderState::Failed);
    assert_eq!(encoded.load(Ordering::SeqCst), 15);
    assert!(aborted.load(Ordering::SeqCst));
    assert_eq!(processor.live_allocations(), 0);
}

#[tokio::test]
async fn test_detached_source_fails_render_without_leaks() {
    let plan = RenderPlan::trim(0, 10.0, 0.5, 3.5, 30)
        .unwrap()
        .with_filters(vec![grade()]);
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);

    let source = SyntheticSource::new(W, H, 10.0);
    let detach = source.detach_handle();
    let source: Box<dyn MediaSource> = Box::new(source);
    let encoder = ProbeEncoder::default();
    let aborted = Arc::clone(&encoder.aborted);

    let mut scheduler = FrameScheduler::default().with_progress(Box::new(move |p: RenderProgress| {
        if p.frames_rendered >= 20 {
            detach.detach();
        }
    }));

    let err = scheduler
        .render(&mut processor, &request, vec![source], Box::new(encoder))
        .await
        .unwrap_err();
    assert!(matches!(err, NebulaError::SourceUnavailable { index: 0, .. }));
    assert_eq!(scheduler.state(), RenderState::Failed);
    assert!(aborted.load(Ordering::SeqCst));

    let stats = scheduler.last_stats().unwrap();
    assert_eq!(stats.frames_rendered, 20);
    assert!(stats.buffers.is_balanced());
    assert_eq!(processor.live_allocations(), 0);
}

#[tokio::test]
async fn test_init_failure_never_reaches_rendering() {
    let plan = RenderPlan::trim(0, 10.0, 0.0, 1.0, 30).unwrap();
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA).with_init_failure();

    let stages = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&stages);
    let encoder = ProbeEncoder::default();
    let begun = Arc::clone(&encoder.begun);

    let mut scheduler = FrameScheduler::default().with_progress(Box::new(move |p: RenderProgress| {
        seen.lock().unwrap().push(p.stage);
    }));

    let err = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 1)], Box::new(encoder))
        .await
        .unwrap_err();
    assert!(matches!(err, NebulaError::Initialization { .. }));
    assert_eq!(scheduler.state(), RenderState::Failed);
    assert_eq!(begun.load(Ordering::SeqCst), 0);

    let stages = stages.lock().unwrap();
    assert!(!stages.contains(&RenderStage::Rendering));
    assert_eq!(stages.last(), Some(&RenderStage::Failed));
}

#[tokio::test]
async fn test_encoder_failure_aborts_and_frees() {
    let plan = RenderPlan::trim(0, 10.0, 1.0, 2.0, 30)
        .unwrap()
        .with_filters(vec![grade()]);
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);
    let encoder = ProbeEncoder {
        fail_after: Some(5),
        ..ProbeEncoder::default()
    };
    let aborted = Arc::clone(&encoder.aborted);

    let mut scheduler = FrameScheduler::default();
    let err = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 1)], Box::new(encoder))
        .await
        .unwrap_err();
    assert!(matches!(err, NebulaError::Encoder { .. }));
    assert_eq!(scheduler.state(), RenderState::Failed);
    assert!(aborted.load(Ordering::SeqCst));
    assert_eq!(processor.live_allocations(), 0);
    assert_eq!(scheduler.last_stats().unwrap().frames_rendered, 5);
}

#[tokio::test]
async fn test_processor_failure_mid_render_frees_everything() {
    let plan = RenderPlan::trim(0, 10.0, 1.0, 2.0, 30)
        .unwrap()
        .with_filters(vec![grade()]);
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA).fail_operations_after(7);

    let mut scheduler = FrameScheduler::default();
    let err = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 1)], raw_encoder())
        .await
        .unwrap_err();
    assert!(matches!(err, NebulaError::Processor { .. }));
    assert_eq!(processor.live_allocations(), 0);
    assert_eq!(processor.invalid_frees(), 0);
    assert!(scheduler.last_stats().unwrap().buffers.is_balanced());
}

#[tokio::test]
async fn test_unsupported_filter_passes_frames_through() {
    let unknown = FilterOp::parse("sepia", &serde_json::json!({})).unwrap();
    let plan = RenderPlan::trim(0, 10.0, 1.0, 1.5, 30)
        .unwrap()
        .with_filters(vec![unknown]);
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);

    let mut scheduler = FrameScheduler::default();
    let artifact = scheduler
        .render(&mut processor, &request, vec![clip(10.0, 77)], raw_encoder())
        .await
        .unwrap();

    assert_eq!(
        first_pixel(&artifact.bytes, 0),
        [77, 50, SyntheticSource::time_tag(1.0), 255]
    );
    let stats = scheduler.last_stats().unwrap();
    assert_eq!(stats.unsupported_fallbacks, 15);
    assert_eq!(stats.buffers.allocations, 0);
}

#[tokio::test]
async fn test_progress_is_monotonic_and_throttled() {
    let plan = RenderPlan::trim(0, 10.0, 2.0, 5.0, 30).unwrap();
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);

    let reports = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reports);
    let mut scheduler = FrameScheduler::new(SchedulerConfig::default()).with_progress(Box::new(
        move |p: RenderProgress| {
            seen.lock().unwrap().push(p);
        },
    ));

    scheduler
        .render(&mut processor, &request, vec![clip(10.0, 1)], raw_encoder())
        .await
        .unwrap();

    let reports = reports.lock().unwrap();
    assert!(reports
        .windows(2)
        .all(|w| w[1].progress >= w[0].progress));
    assert!(reports.iter().all(|p| (0.0..=1.0).contains(&p.progress)));

    let rendering = reports
        .iter()
        .filter(|p| p.stage == RenderStage::Rendering)
        .count();
    assert_eq!(rendering, 9);

    let last = reports.last().unwrap();
    assert_eq!(last.stage, RenderStage::Complete);
    assert_eq!(last.progress, 1.0);
    assert_eq!(last.frames_rendered, 90);
}

#[tokio::test]
async fn test_watermark_and_canvas_cap() {
    let plan = RenderPlan::trim(0, 2.0, 0.5, 0.6, 30).unwrap();
    let stamp = Frame::solid(2, 2, [255, 255, 255, 255]);
    let watermark = Watermark::new(stamp)
        .with_margin(0)
        .with_opacity(1.0)
        .unwrap();
    let request = RenderRequest::new(plan, raw())
        .with_max_size(16, 16)
        .with_watermark(watermark);
    let mut processor = CpuEffectProcessor::new(ARENA);

    let source: Box<dyn MediaSource> =
        Box::new(SyntheticSource::new(64, 32, 2.0).with_base(0, 0));
    let mut scheduler = FrameScheduler::default();
    let artifact = scheduler
        .render(&mut processor, &request, vec![source], raw_encoder())
        .await
        .unwrap();

    assert_eq!((artifact.metadata.width, artifact.metadata.height), (16, 8));
    assert_eq!(artifact.metadata.frame_count, 3);

    let header = RawStreamHeader::decode(&artifact.bytes).unwrap();
    let frame = header.frame(&artifact.bytes, 0).unwrap();
    let at = |x: usize, y: usize| {
        let i = (y * 16 + x) * 4;
        [frame[i], frame[i + 1], frame[i + 2], frame[i + 3]]
    };
    assert_eq!(at(15, 7), [255, 255, 255, 255]);
    assert_eq!(at(14, 6), [255, 255, 255, 255]);
    assert_ne!(at(0, 0), [255, 255, 255, 255]);
}

#[tokio::test]
async fn test_missing_source_slot_fails_before_init() {
    let plan = RenderPlan::join(
        2.0,
        2.0,
        TransitionSpec::new(TransitionKind::Fade, 0.5),
        30,
    )
    .unwrap();
    let request = RenderRequest::new(plan, raw());
    let mut processor = CpuEffectProcessor::new(ARENA);

    let mut scheduler = FrameScheduler::default();
    let err = scheduler
        .render(&mut processor, &request, vec![clip(2.0, 1)], raw_encoder())
        .await
        .unwrap_err();
    assert!(matches!(err, NebulaError::SourceUnavailable { index: 1, .. }));
    assert_eq!(scheduler.state(), RenderState::Failed);
    assert_eq!(processor.malloc_count(), 0);
}
