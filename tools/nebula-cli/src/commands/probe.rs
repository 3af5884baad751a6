//! Show media information.

use std::path::PathBuf;

use nebula_render_engine::source::probe_media;

pub async fn run(input: PathBuf) -> anyhow::Result<()> {
    if !input.exists() {
        return Err(anyhow::anyhow!("File not found: {}", input.display()));
    }
    let info = probe_media(&input).await?;

    println!("{}", input.display());
    println!("  Resolution: {}x{}", info.width, info.height);
    println!("  Duration:   {:.3}s", info.duration_secs);
    Ok(())
}
