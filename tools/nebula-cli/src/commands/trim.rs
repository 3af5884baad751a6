//! Cut a time range out of a clip.

use std::path::PathBuf;

use nebula_common::config::AppConfig;
use nebula_render_engine::source::probe_media;
use nebula_render_model::{RenderPlan, RenderRequest};

use super::{execute, OutputArgs};

pub async fn run(
    config: &AppConfig,
    input: PathBuf,
    start: f64,
    end: Option<f64>,
    output: OutputArgs,
) -> anyhow::Result<()> {
    println!("Trimming: {}", input.display());

    let info = probe_media(&input)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", input.display()))?;
    let end = end.unwrap_or(info.duration_secs);
    println!("  Range: {start:.3}s .. {end:.3}s of {:.3}s", info.duration_secs);

    let plan = RenderPlan::trim(0, info.duration_secs, start, end, output.fps(config))?;
    let request = RenderRequest::new(plan, output.encoding(config)?)
        .with_max_size(config.render.max_width, config.render.max_height);
    let output_path = output.output_path(config, &input, "trim");

    execute(config, vec![input], output_path, request).await
}
