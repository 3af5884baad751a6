pub mod check;
pub mod config;
pub mod filter;
pub mod join;
pub mod plan;
pub mod probe;
pub mod trim;
pub mod watermark;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use clap::Args;

use nebula_common::config::AppConfig;
use nebula_effects::CpuEffectProcessor;
use nebula_render_engine::{export_to_file, ExportJob, FrameScheduler, RenderProgress, SchedulerConfig};
use nebula_render_model::{EncodingDescriptor, FilterOp, RenderRequest};

/// Output flags shared by every rendering command.
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output file path (extension added from the container when missing)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Container: webm, mp4, raw
    #[arg(long)]
    pub container: Option<String>,

    /// Video codec: vp8, vp9, h264, h265, raw
    #[arg(long)]
    pub codec: Option<String>,

    /// Video bitrate in kbps
    #[arg(long)]
    pub bitrate: Option<u32>,
}

impl OutputArgs {
    pub fn fps(&self, config: &AppConfig) -> u32 {
        self.fps.unwrap_or(config.render.fps)
    }

    /// Encoding from flags, falling back to configured defaults. A container
    /// given without a codec uses that container's default codec.
    pub fn encoding(&self, config: &AppConfig) -> anyhow::Result<EncodingDescriptor> {
        let container = self
            .container
            .clone()
            .unwrap_or_else(|| config.render.container.clone());
        let codec = match (&self.codec, &self.container) {
            (Some(codec), _) => codec.clone(),
            (None, Some(_)) => String::new(),
            (None, None) => config.render.video_codec.clone(),
        };
        let bitrate = self.bitrate.unwrap_or(config.render.bitrate_kbps);
        Ok(EncodingDescriptor::parse(&container, &codec, bitrate)?)
    }

    pub fn output_path(&self, config: &AppConfig, input: &Path, suffix: &str) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string());
            config.output_dir.join(format!("{stem}-{suffix}"))
        })
    }
}

/// Parse `kind` or `kind:{json}`.
pub fn parse_filter(spec: &str) -> anyhow::Result<FilterOp> {
    let (kind, params) = match spec.split_once(':') {
        Some((kind, json)) => {
            let params: serde_json::Value = serde_json::from_str(json)
                .map_err(|e| anyhow::anyhow!("Invalid params for filter '{kind}': {e}"))?;
            (kind, params)
        }
        None => (spec, serde_json::Value::Null),
    };
    Ok(FilterOp::parse(kind, &params)?)
}

pub fn parse_filters(specs: &[String]) -> anyhow::Result<Vec<FilterOp>> {
    specs.iter().map(|s| parse_filter(s)).collect()
}

/// Render `request` from `inputs` into `output_path`, printing progress.
/// Ctrl-C cancels the render at the next frame.
pub async fn execute(
    config: &AppConfig,
    inputs: Vec<PathBuf>,
    output_path: PathBuf,
    request: RenderRequest,
) -> anyhow::Result<()> {
    let job = ExportJob {
        inputs,
        output_path,
        request,
    };
    println!("  Output: {}", job.resolved_output_path().display());
    println!(
        "  Encoding: {} / {} @ {} kbps",
        job.request.encoding.container, job.request.encoding.codec, job.request.encoding.bitrate_kbps
    );
    println!(
        "  Frames: {} at {} fps",
        job.request.plan.total_frames(),
        job.request.fps()
    );

    let mut processor = CpuEffectProcessor::new(config.render.arena_bytes);
    let mut scheduler = FrameScheduler::new(SchedulerConfig::from_defaults(&config.render))
        .with_progress(Box::new(|p: RenderProgress| {
            print!(
                "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
                p.progress * 100.0,
                p.frames_rendered,
                p.total_frames,
                p.eta_secs,
            );
            let _ = std::io::stdout().flush();
        }));

    let cancel = scheduler.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling render");
            cancel.cancel();
        }
    });

    let result = export_to_file(&job, &mut scheduler, &mut processor).await;
    ctrl_c.abort();
    println!();

    let outcome = result?;
    println!("Render complete: {}", outcome.output_path.display());
    println!(
        "  {}x{}, {} frames, {:.2}s, {} bytes",
        outcome.metadata.width,
        outcome.metadata.height,
        outcome.metadata.frame_count,
        outcome.metadata.duration_secs,
        outcome.metadata.size_bytes
    );
    if let Some(stats) = scheduler.last_stats() {
        if stats.seek_timeouts > 0 || stats.unsupported_fallbacks > 0 {
            println!(
                "  {} seek timeouts, {} unsupported operations rendered with fallbacks",
                stats.seek_timeouts, stats.unsupported_fallbacks
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> OutputArgs {
        OutputArgs {
            output: None,
            fps: None,
            container: None,
            codec: None,
            bitrate: None,
        }
    }

    #[test]
    fn test_parse_filter_with_params() {
        let op = parse_filter(r#"blur:{"radius": 3}"#).unwrap();
        assert_eq!(op, FilterOp::Blur { radius: 3 });
    }

    #[test]
    fn test_parse_filter_without_params_uses_defaults() {
        let op = parse_filter("blur").unwrap();
        assert_eq!(op, FilterOp::Blur { radius: 5 });
        assert!(parse_filter("blur:{not json").is_err());
    }

    #[test]
    fn test_encoding_falls_back_to_config() {
        let config = AppConfig::default();
        let enc = args().encoding(&config).unwrap();
        assert_eq!(enc, EncodingDescriptor::default());
    }

    #[test]
    fn test_container_flag_picks_its_default_codec() {
        let config = AppConfig::default();
        let mut args = args();
        args.container = Some("mp4".to_string());
        let enc = args.encoding(&config).unwrap();
        assert_eq!(enc.codec.to_string(), "h264");
    }

    #[test]
    fn test_default_output_path() {
        let config = AppConfig::default();
        let path = args().output_path(&config, Path::new("/videos/demo.webm"), "trim");
        assert_eq!(path, config.output_dir.join("demo-trim"));
    }
}
