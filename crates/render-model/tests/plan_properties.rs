//! Property tests for render plan invariants.

use nebula_render_model::{FrameSources, PhaseKind, RenderPlan, TransitionKind, TransitionSpec};
use proptest::prelude::*;

fn fps_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(24u32), Just(25), Just(30), Just(60)]
}

/// Trims produce `round(len * fps)` frames and land within one frame of the
/// requested length.
#[test]
fn proptest_trim_frame_count() {
    proptest!(|(start in 0.0f64..8.0, len in 0.1f64..2.0, fps in fps_strategy())| {
        let end = start + len;
        let plan = RenderPlan::trim(0, 10.0, start, end, fps).unwrap();

        let expected = ((end - start) * fps as f64).round() as u64;
        prop_assert_eq!(plan.total_frames(), expected);
        prop_assert!((plan.duration_secs() - len).abs() <= 1.0 / fps as f64);
    });
}

/// Blended phases ramp progress evenly from 0 to 1.
#[test]
fn proptest_blend_progress_ramp() {
    proptest!(|(d1 in 1.0f64..10.0, d2 in 1.0f64..10.0, frac in 0.1f64..0.9, fps in fps_strategy())| {
        let d = d1.min(d2) * frac;
        let plan = RenderPlan::join(d1, d2, TransitionSpec::new(TransitionKind::Dissolve, d), fps).unwrap();

        let blend = plan
            .phases
            .iter()
            .find(|p| matches!(p.kind, PhaseKind::Blended { .. }))
            .unwrap();

        let exact = d * fps as f64;
        let snapped = (exact - exact.round()).abs() < 1e-6;
        prop_assert!(
            blend.frame_count == exact.ceil() as u64
                || (snapped && blend.frame_count == exact.round() as u64)
        );

        let values = blend.progress_values();
        prop_assert_eq!(values.len() as u64, blend.frame_count);
        prop_assert_eq!(values[0], 0.0);
        prop_assert_eq!(*values.last().unwrap(), 1.0);
        for pair in values.windows(2) {
            prop_assert!(pair[1] > pair[0]);
        }
    });
}

/// Frame tasks cover every frame once, contiguously and in order.
#[test]
fn proptest_join_tasks_are_contiguous() {
    proptest!(ProptestConfig::with_cases(64), |(d1 in 0.5f64..6.0, d2 in 0.5f64..6.0, frac in 0.0f64..1.0, fps in fps_strategy())| {
        let d = d1.min(d2) * frac;
        let plan = RenderPlan::join(d1, d2, TransitionSpec::new(TransitionKind::Fade, d), fps).unwrap();
        prop_assert!(plan.validate().is_ok());

        let sum: u64 = plan.phases.iter().map(|p| p.frame_count).sum();
        prop_assert_eq!(plan.total_frames(), sum);

        let tasks: Vec<_> = plan.frame_tasks().collect();
        prop_assert_eq!(tasks.len() as u64, sum);
        for (i, task) in tasks.iter().enumerate() {
            prop_assert_eq!(task.index, i as u64);
            if let FrameSources::Blended { progress, .. } = task.sources {
                prop_assert!((0.0..=1.0).contains(&progress));
            }
        }
        for pair in tasks.windows(2) {
            prop_assert!(pair[1].output_secs > pair[0].output_secs);
        }
    });
}
