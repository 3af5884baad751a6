//! Print a render plan as JSON without rendering anything.

use nebula_render_model::{RenderPlan, TransitionKind, TransitionSpec};

use super::parse_filters;

pub fn run(
    clips: Vec<f64>,
    start: f64,
    end: Option<f64>,
    transition: String,
    duration: f64,
    filters: Vec<String>,
    fps: u32,
) -> anyhow::Result<()> {
    let plan = build(&clips, start, end, &transition, duration, fps)?
        .with_filters(parse_filters(&filters)?);

    println!("{}", serde_json::to_string_pretty(&plan)?);
    eprintln!(
        "{} phases, {} frames, {:.3}s",
        plan.phases.len(),
        plan.total_frames(),
        plan.duration_secs()
    );
    Ok(())
}

fn build(
    clips: &[f64],
    start: f64,
    end: Option<f64>,
    transition: &str,
    duration: f64,
    fps: u32,
) -> anyhow::Result<RenderPlan> {
    match clips {
        [len] => Ok(RenderPlan::trim(0, *len, start, end.unwrap_or(*len), fps)?),
        [first, second] => Ok(RenderPlan::join(
            *first,
            *second,
            TransitionSpec::new(TransitionKind::parse(transition), duration),
            fps,
        )?),
        _ => Err(anyhow::anyhow!(
            "Give one --clip to plan a trim or two to plan a join"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_clip_plans_a_trim() {
        let plan = build(&[10.0], 2.0, Some(5.0), "fade", 1.0, 30).unwrap();
        assert_eq!(plan.total_frames(), 90);
    }

    #[test]
    fn test_two_clips_plan_a_join() {
        let plan = build(&[5.0, 5.0], 0.0, None, "crossfade", 1.0, 30).unwrap();
        let counts: Vec<u64> = plan.phases.iter().map(|p| p.frame_count).collect();
        assert_eq!(counts, vec![120, 30, 120]);
    }

    #[test]
    fn test_three_clips_are_rejected() {
        assert!(build(&[1.0, 2.0, 3.0], 0.0, None, "fade", 1.0, 30).is_err());
    }
}
