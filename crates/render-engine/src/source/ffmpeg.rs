//! File-backed source decoded through the `ffmpeg` binaries.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::Frame;

use super::MediaSource;

/// What `ffprobe` reports about a media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

/// A video file sampled one frame at a time.
///
/// Seeks only record the target; the decode happens on snapshot, so a seek
/// always confirms immediately.
#[derive(Debug)]
pub struct FfmpegSource {
    path: PathBuf,
    info: MediaInfo,
    position: f64,
}

impl FfmpegSource {
    pub async fn open(path: impl AsRef<Path>) -> NebulaResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(NebulaError::FileNotFound { path });
        }
        let info = probe_media(&path).await?;
        tracing::debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            duration_secs = info.duration_secs,
            "Opened media source"
        );
        Ok(Self {
            path,
            info,
            position: 0.0,
        })
    }

    pub fn info(&self) -> MediaInfo {
        self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl MediaSource for FfmpegSource {
    fn duration_secs(&self) -> f64 {
        self.info.duration_secs
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn current_secs(&self) -> f64 {
        self.position
    }

    async fn seek(&mut self, secs: f64) -> NebulaResult<()> {
        self.position = secs;
        Ok(())
    }

    async fn snapshot(&mut self) -> NebulaResult<Frame> {
        let output = tokio::process::Command::new("ffmpeg")
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.6}", self.position))
            .arg("-i")
            .arg(&self.path)
            .args([
                "-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1",
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NebulaError::invalid_state(format!(
                "ffmpeg decode at {:.3}s failed: {}",
                self.position,
                stderr.trim()
            )));
        }

        Frame::new(self.info.width, self.info.height, output.stdout)
    }
}

/// Read dimensions and duration of the first video stream.
pub async fn probe_media(path: &Path) -> NebulaResult<MediaInfo> {
    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:format=duration",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .output()
        .await?;

    if !output.status.success() {
        return Err(NebulaError::unsupported(format!(
            "ffprobe could not read {}",
            path.display()
        )));
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&raw).ok_or_else(|| {
        NebulaError::unsupported(format!(
            "no video stream with a known duration in {}",
            path.display()
        ))
    })
}

fn parse_probe_output(raw: &str) -> Option<MediaInfo> {
    let mut dims = None;
    let mut duration = None;
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some((w, h)) = line.split_once('x') {
            let width = w.parse::<u32>().ok()?;
            let height = h.parse::<u32>().ok()?;
            dims = Some((width, height));
        } else if let Ok(secs) = line.parse::<f64>() {
            duration = Some(secs);
        }
    }

    let (width, height) = dims?;
    let duration_secs = duration?;
    if width == 0 || height == 0 || duration_secs.is_nan() || duration_secs <= 0.0 {
        return None;
    }
    Some(MediaInfo {
        width,
        height,
        duration_secs,
    })
}

/// Whether `binary` resolves on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
