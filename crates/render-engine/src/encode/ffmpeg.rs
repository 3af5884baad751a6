//! Encoder that pipes raw RGBA frames into an `ffmpeg` child process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use nebula_common::error::{NebulaError, NebulaResult};
use nebula_render_model::{Container, EncodingDescriptor, VideoCodec};

use super::FrameEncoder;
use crate::source::command_exists;

static NEXT_OUTPUT_ID: AtomicU64 = AtomicU64::new(0);

/// Encodes through the system `ffmpeg` into a scratch file, then returns
/// the file's bytes.
pub struct FfmpegEncoder {
    encoding: EncodingDescriptor,
    scratch_path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_task: Option<JoinHandle<String>>,
}

impl FfmpegEncoder {
    /// Fails with `Unsupported` when `ffmpeg` is missing or the descriptor is raw.
    pub fn new(encoding: EncodingDescriptor, scratch_dir: &Path) -> NebulaResult<Self> {
        encoding.validate()?;
        if encoding.container == Container::Raw {
            return Err(NebulaError::unsupported(
                "raw output is written by the raw encoder, not ffmpeg",
            ));
        }
        if !command_exists("ffmpeg") {
            return Err(NebulaError::unsupported("ffmpeg not found in PATH"));
        }
        std::fs::create_dir_all(scratch_dir)?;

        let id = NEXT_OUTPUT_ID.fetch_add(1, Ordering::Relaxed);
        let scratch_path = scratch_dir.join(format!(
            "nebula-encode-{}-{id}.{}",
            std::process::id(),
            encoding.extension()
        ));

        Ok(Self {
            encoding,
            scratch_path,
            child: None,
            stdin: None,
            stderr_task: None,
        })
    }

    async fn cleanup(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
        let _ = tokio::fs::remove_file(&self.scratch_path).await;
    }

    /// Close stdin, wait for ffmpeg, and read the finished file back.
    async fn finalize(&mut self) -> NebulaResult<Vec<u8>> {
        let Some(mut stdin) = self.stdin.take() else {
            return Err(NebulaError::encoder("ffmpeg encoder is not running"));
        };
        stdin
            .shutdown()
            .await
            .map_err(|e| NebulaError::encoder(format!("failed to close ffmpeg stdin: {e}")))?;
        drop(stdin);

        let Some(mut child) = self.child.take() else {
            return Err(NebulaError::encoder("ffmpeg process missing"));
        };
        let status = child
            .wait()
            .await
            .map_err(|e| NebulaError::encoder(format!("failed to wait for ffmpeg: {e}")))?;

        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(NebulaError::encoder(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&self.scratch_path).await.map_err(|e| {
            NebulaError::encoder(format!(
                "failed to read ffmpeg output {}: {e}",
                self.scratch_path.display()
            ))
        })?;
        let _ = tokio::fs::remove_file(&self.scratch_path).await;
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl FrameEncoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn begin(&mut self, width: u32, height: u32, fps: u32) -> NebulaResult<()> {
        if self.child.is_some() {
            return Err(NebulaError::encoder("ffmpeg encoder already started"));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(fps.to_string())
            .args(["-i", "pipe:0", "-an"])
            .args(codec_args(&self.encoding)?)
            .arg(&self.scratch_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            codec = %self.encoding.codec,
            path = %self.scratch_path.display(),
            "Starting ffmpeg encoder"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| NebulaError::encoder(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| NebulaError::encoder("ffmpeg stdin unavailable"))?;

        self.stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });
        self.stdin = Some(stdin);
        self.child = Some(child);
        Ok(())
    }

    async fn encode(&mut self, rgba: &[u8]) -> NebulaResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(NebulaError::encoder("ffmpeg encoder is not running"));
        };
        stdin
            .write_all(rgba)
            .await
            .map_err(|e| NebulaError::encoder(format!("failed to write frame to ffmpeg: {e}")))
    }

    async fn finish(&mut self) -> NebulaResult<Vec<u8>> {
        let result = self.finalize().await;
        if result.is_err() {
            self.cleanup().await;
        }
        result
    }

    async fn abort(&mut self) {
        self.cleanup().await;
    }
}

/// Codec arguments for an encoding descriptor.
pub fn codec_args(encoding: &EncodingDescriptor) -> NebulaResult<Vec<String>> {
    let bitrate = format!("{}k", encoding.bitrate_kbps);
    let args: Vec<&str> = match encoding.codec {
        VideoCodec::Vp8 => vec!["-c:v", "libvpx", "-b:v", bitrate.as_str(), "-deadline", "realtime"],
        VideoCodec::Vp9 => vec!["-c:v", "libvpx-vp9", "-b:v", bitrate.as_str(), "-row-mt", "1"],
        VideoCodec::H264 => vec![
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-profile:v",
            "high",
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            bitrate.as_str(),
            "-movflags",
            "+faststart",
        ],
        VideoCodec::H265 => vec![
            "-c:v",
            "libx265",
            "-preset",
            "medium",
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            bitrate.as_str(),
            "-movflags",
            "+faststart",
        ],
        VideoCodec::Raw => {
            return Err(NebulaError::unsupported("ffmpeg does not write raw streams"));
        }
    };
    Ok(args.into_iter().map(str::to_string).collect())
}
