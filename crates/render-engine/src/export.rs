//! File export: open input files, run a render, and write the artifact.

use std::path::{Path, PathBuf};

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_effects::NativeEffectProcessor;
use nebula_render_model::{ArtifactMetadata, Container, EncodingDescriptor, RenderRequest};

use crate::encode::{FfmpegEncoder, FrameEncoder, RawVideoEncoder};
use crate::scheduler::FrameScheduler;
use crate::source::{FfmpegSource, MediaSource};

/// An export job ready to be rendered.
#[derive(Debug, Clone)]
pub struct ExportJob {
    /// Input media files, bound to plan source indices by position.
    pub inputs: Vec<PathBuf>,

    /// Output file path. The container extension is added when missing.
    pub output_path: PathBuf,

    pub request: RenderRequest,
}

/// Where an export landed.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub output_path: PathBuf,
    /// JSON sidecar holding [`ArtifactMetadata`].
    pub metadata_path: PathBuf,
    pub metadata: ArtifactMetadata,
}

impl ExportJob {
    /// Output path with the container's extension applied.
    pub fn resolved_output_path(&self) -> PathBuf {
        if self.output_path.extension().is_some() {
            self.output_path.clone()
        } else {
            self.output_path
                .with_extension(self.request.encoding.extension())
        }
    }
}

/// Open every input as an ffmpeg-backed source.
pub async fn open_sources(inputs: &[PathBuf]) -> NebulaResult<Vec<Box<dyn MediaSource>>> {
    let mut sources: Vec<Box<dyn MediaSource>> = Vec::with_capacity(inputs.len());
    for path in inputs {
        sources.push(Box::new(FfmpegSource::open(path).await?));
    }
    Ok(sources)
}

/// Pick the encoder that can produce `encoding`.
pub fn encoder_for(
    encoding: &EncodingDescriptor,
    scratch_dir: &Path,
) -> NebulaResult<Box<dyn FrameEncoder>> {
    match encoding.container {
        Container::Raw => Ok(Box::new(RawVideoEncoder::new())),
        Container::Webm | Container::Mp4 => {
            Ok(Box::new(FfmpegEncoder::new(*encoding, scratch_dir)?))
        }
    }
}

/// Render `job` and write the artifact plus a metadata sidecar.
///
/// Nothing is written unless the render completes.
pub async fn export_to_file(
    job: &ExportJob,
    scheduler: &mut FrameScheduler,
    processor: &mut dyn NativeEffectProcessor,
) -> NebulaResult<ExportOutcome> {
    let output_path = job.resolved_output_path();
    tracing::info!(
        output = %output_path.display(),
        inputs = job.inputs.len(),
        container = %job.request.encoding.container,
        codec = %job.request.encoding.codec,
        "Starting export"
    );

    for input in &job.inputs {
        if !input.exists() {
            return Err(NebulaError::FileNotFound {
                path: input.clone(),
            });
        }
    }

    let sources = open_sources(&job.inputs).await?;
    let scratch_dir = std::env::temp_dir().join("nebula");
    let encoder = encoder_for(&job.request.encoding, &scratch_dir)?;

    let artifact = scheduler
        .render(processor, &job.request, sources, encoder)
        .await?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(&output_path, &artifact.bytes).await?;

    let metadata_path = metadata_path_for(&output_path);
    let json = serde_json::to_string_pretty(&artifact.metadata)?;
    tokio::fs::write(&metadata_path, json).await?;

    tracing::info!(
        output = %output_path.display(),
        size_bytes = artifact.metadata.size_bytes,
        "Export written"
    );

    Ok(ExportOutcome {
        output_path,
        metadata_path,
        metadata: artifact.metadata,
    })
}

/// `clip.webm` → `clip.webm.json`.
pub fn metadata_path_for(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use nebula_render_model::RenderPlan;

    use super::*;

    fn job(output: &str, container: &str) -> ExportJob {
        let plan = RenderPlan::full(0, 1.0, 30).unwrap();
        let encoding = EncodingDescriptor::parse(container, "", 1000).unwrap();
        ExportJob {
            inputs: vec![PathBuf::from("in.webm")],
            output_path: PathBuf::from(output),
            request: RenderRequest::new(plan, encoding),
        }
    }

    #[test]
    fn test_extension_is_added_when_missing() {
        assert_eq!(
            job("out/clip", "mp4").resolved_output_path(),
            PathBuf::from("out/clip.mp4")
        );
        assert_eq!(
            job("out/clip.mkv", "webm").resolved_output_path(),
            PathBuf::from("out/clip.mkv")
        );
    }

    #[test]
    fn test_metadata_sidecar_path() {
        assert_eq!(
            metadata_path_for(Path::new("/tmp/a.nbrv")),
            PathBuf::from("/tmp/a.nbrv.json")
        );
    }

    #[test]
    fn test_raw_encoder_needs_no_ffmpeg() {
        let encoding = EncodingDescriptor::parse("raw", "", 0).unwrap();
        let encoder = encoder_for(&encoding, &std::env::temp_dir()).unwrap();
        assert_eq!(encoder.name(), "raw");
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_render() {
        let mut scheduler = FrameScheduler::default();
        let mut processor = nebula_effects::CpuEffectProcessor::new(1 << 20);
        let err = export_to_file(&job("/tmp/nebula-never", "raw"), &mut scheduler, &mut processor)
            .await
            .unwrap_err();
        assert!(matches!(err, NebulaError::FileNotFound { .. }));
        assert_eq!(scheduler.state(), crate::scheduler::RenderState::Idle);
    }
}
