//! Manifest-to-MP3 transcoding via ffmpeg.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Produce a single MP3 at `output` from the playlist at `manifest`.
    async fn transcode(&self, manifest: &Path, output: &Path) -> Result<()>;
}

pub struct FfmpegTranscoder {
    binary: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, manifest: &Path, output: &Path) -> Result<()> {
        // -c:a libmp3lame: MP3 codec
        // -b:a 192k: bitrate
        // -q:a 2: quality
        // -y: overwrite output without asking
        let result = Command::new(&self.binary)
            .arg("-i")
            .arg(manifest)
            .args(["-c:a", "libmp3lame"])
            .args(["-b:a", "192k"])
            .args(["-q:a", "2"])
            .args(["-y"])
            .arg(output)
            .output()
            .await
            .context("Failed to run ffmpeg")?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            bail!("ffmpeg transcode failed: {}", stderr);
        }

        if !output.exists() {
            bail!("ffmpeg did not produce an output file");
        }

        Ok(())
    }
}
