//! Apply a filter chain to a whole clip.

use std::path::PathBuf;

use nebula_common::config::AppConfig;
use nebula_render_engine::source::probe_media;
use nebula_render_model::{RenderPlan, RenderRequest};

use super::{execute, parse_filters, OutputArgs};

pub async fn run(
    config: &AppConfig,
    input: PathBuf,
    filters: Vec<String>,
    output: OutputArgs,
) -> anyhow::Result<()> {
    println!("Filtering: {}", input.display());

    let filters = parse_filters(&filters)?;
    for op in &filters {
        println!("  Filter: {}", op.name());
    }

    let info = probe_media(&input)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", input.display()))?;
    let plan = RenderPlan::full(0, info.duration_secs, output.fps(config))?.with_filters(filters);
    let request = RenderRequest::new(plan, output.encoding(config)?)
        .with_max_size(config.render.max_width, config.render.max_height);
    let output_path = output.output_path(config, &input, "filtered");

    execute(config, vec![input], output_path, request).await
}
