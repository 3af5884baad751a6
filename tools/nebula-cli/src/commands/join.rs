//! Join two clips with a transition.

use std::path::PathBuf;

use nebula_common::config::AppConfig;
use nebula_render_engine::source::probe_media;
use nebula_render_model::{
    RenderPlan, RenderRequest, TransitionKind, TransitionPreset, TransitionSpec,
};

use super::{execute, OutputArgs};

pub async fn run(
    config: &AppConfig,
    first: PathBuf,
    second: PathBuf,
    transition: String,
    duration: f64,
    preset: Option<String>,
    output: OutputArgs,
) -> anyhow::Result<()> {
    println!("Joining: {} + {}", first.display(), second.display());

    let (kind, duration) = match preset {
        Some(name) => TransitionPreset::parse(&name)
            .map(TransitionPreset::resolve)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown preset: {name}. Use: quick, standard, smooth, dramatic, slideshow, cinematic"
                )
            })?,
        None => (TransitionKind::parse(&transition), duration),
    };
    if let TransitionKind::Unsupported { kind: name } = &kind {
        if kind.is_faded() {
            println!("  Transition '{name}' has no dedicated blend, rendering as fade");
        } else {
            println!("  Unknown transition '{name}', rendering as fade");
        }
    }
    println!("  Transition: {} ({duration:.2}s)", kind.label());

    let a = probe_media(&first)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", first.display()))?;
    let b = probe_media(&second)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", second.display()))?;

    let plan = RenderPlan::join(
        a.duration_secs,
        b.duration_secs,
        TransitionSpec::new(kind, duration),
        output.fps(config),
    )?;
    let request = RenderRequest::new(plan, output.encoding(config)?)
        .with_max_size(config.render.max_width, config.render.max_height);
    let output_path = output.output_path(config, &first, "joined");

    execute(config, vec![first, second], output_path, request).await
}
