//! Stamp an image over every frame of a clip.

use std::path::{Path, PathBuf};

use nebula_common::config::AppConfig;
use nebula_render_engine::source::probe_media;
use nebula_render_model::{Frame, RenderPlan, RenderRequest, Watermark, WatermarkAnchor};

use super::{execute, OutputArgs};

pub async fn run(
    config: &AppConfig,
    input: PathBuf,
    stamp: PathBuf,
    anchor: String,
    opacity: f32,
    margin: u32,
    output: OutputArgs,
) -> anyhow::Result<()> {
    println!("Watermarking: {}", input.display());

    let anchor: WatermarkAnchor = anchor.parse()?;
    let watermark = Watermark::new(load_stamp(&stamp)?)
        .with_anchor(anchor)
        .with_margin(margin)
        .with_opacity(opacity)?;
    println!(
        "  Stamp: {} ({}x{}, {:?}, opacity {:.2})",
        stamp.display(),
        watermark.stamp.width,
        watermark.stamp.height,
        watermark.anchor,
        watermark.opacity
    );

    let info = probe_media(&input)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", input.display()))?;
    let plan = RenderPlan::full(0, info.duration_secs, output.fps(config))?;
    let request = RenderRequest::new(plan, output.encoding(config)?)
        .with_max_size(config.render.max_width, config.render.max_height)
        .with_watermark(watermark);
    let output_path = output.output_path(config, &input, "watermarked");

    execute(config, vec![input], output_path, request).await
}

fn load_stamp(path: &Path) -> anyhow::Result<Frame> {
    let image = image::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to load stamp {}: {e}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(width, height, image.into_raw())?)
}
