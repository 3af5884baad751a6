//! Check system capabilities.

use nebula_common::config::AppConfig;
use nebula_effects::{CpuEffectProcessor, EffectInvoker, NativeEffectProcessor};
use nebula_render_engine::source::command_exists;
use nebula_render_model::{Frame, TransitionKind};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Nebula System Check");
    println!("{}", "=".repeat(50));

    let mut all_ok = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found in PATH");
        } else {
            println!("[MISSING] {binary} not found in PATH (only raw output is available)");
            all_ok = false;
        }
    }

    let mut processor = CpuEffectProcessor::new(config.render.arena_bytes);
    match processor.init().await {
        Ok(()) => {
            let mut invoker = EffectInvoker::new(&mut processor, 4, 4)?;
            let metrics = invoker.analyze(&Frame::solid(4, 4, [0, 0, 0, 255]))?;
            println!(
                "[OK] Effect processor ready (arena {} MiB, blank frame detected: {})",
                config.render.arena_bytes / (1024 * 1024),
                metrics.is_flat
            );
        }
        Err(e) => {
            println!("[FAIL] Effect processor: {e}");
            all_ok = false;
        }
    }

    println!();
    println!("Render defaults:");
    println!(
        "  {} fps, {}x{} max, {} / {} @ {} kbps, seek timeout {} ms",
        config.render.fps,
        config.render.max_width,
        config.render.max_height,
        config.render.container,
        config.render.video_codec,
        config.render.bitrate_kbps,
        config.render.seek_timeout_ms
    );
    println!("  Output directory: {}", config.output_dir.display());

    println!();
    println!("Transitions:");
    for kind in TransitionKind::CATALOG.iter() {
        println!("  {:<14} {}", kind.name(), kind.label());
    }
    for name in TransitionKind::FADED {
        println!("  {name:<14} (rendered as fade)");
    }

    println!();
    if all_ok {
        println!("All capabilities are available. Nebula is ready.");
    } else {
        println!("Some capabilities are missing. See above for details.");
    }
    Ok(())
}
