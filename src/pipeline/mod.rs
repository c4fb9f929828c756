//! Conversion pipeline: segment download, transcode, archive upload.
//!
//! Every run works inside a scoped temp directory whose drop is the
//! cleanup guarantee, on every exit path. Whether the run *succeeded* is
//! the returned `Result`, decided independently of cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

pub mod transcoder;

pub use transcoder::{FfmpegTranscoder, Transcoder};

use crate::error::OrchestratorError;
use crate::storage::ObjectStore;

pub const PLAYLIST_EXTENSION: &str = ".m3u8";

#[derive(Debug, Clone)]
pub struct ArchivedRecording {
    pub key: String,
}

pub struct ConversionPipeline {
    storage: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
}

impl ConversionPipeline {
    pub fn new(storage: Arc<dyn ObjectStore>, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            storage,
            transcoder,
        }
    }

    /// Download every source segment, transcode the playlist into one MP3,
    /// and upload it as `{channel_name}.mp3`.
    pub async fn convert(
        &self,
        channel_name: &str,
        source_urls: &[String],
    ) -> Result<ArchivedRecording, OrchestratorError> {
        let scope = tempfile::Builder::new()
            .prefix("voxrelay-convert-")
            .tempdir()?;

        let result = self.run(channel_name, source_urls, scope.path()).await;
        match &result {
            Ok(archived) => info!(
                "Conversion for '{}' archived as {}",
                channel_name, archived.key
            ),
            Err(e) => error!("{e}"),
        }
        // `scope` drops here: the temp area is released on every path.
        result
    }

    async fn run(
        &self,
        channel_name: &str,
        source_urls: &[String],
        work_dir: &Path,
    ) -> Result<ArchivedRecording, OrchestratorError> {
        let failed = |reason: String| OrchestratorError::ConversionFailed {
            channel: channel_name.to_string(),
            reason,
        };

        if source_urls.is_empty() {
            return Err(failed("no recorded segments to convert".to_string()));
        }

        // Segments download concurrently; the transcode waits for all of them.
        let mut handles = Vec::with_capacity(source_urls.len());
        for (index, url) in source_urls.iter().enumerate() {
            let storage = Arc::clone(&self.storage);
            let url = url.clone();
            let dest = work_dir.join(segment_file_name(&url, index));
            handles.push(tokio::spawn(async move {
                storage.download(&url, &dest).await.map(|_| dest)
            }));
        }

        let mut downloaded = Vec::with_capacity(handles.len());
        for handle in handles {
            let path = handle
                .await
                .map_err(|e| failed(format!("download task failed: {e}")))?
                .map_err(|e| failed(format!("segment download failed: {e}")))?;
            downloaded.push(path);
        }

        let manifest = downloaded
            .iter()
            .find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(PLAYLIST_EXTENSION))
            })
            .ok_or_else(|| failed("no playlist manifest among downloaded segments".to_string()))?;

        let output = work_dir.join(format!("{channel_name}.mp3"));
        self.transcoder
            .transcode(manifest, &output)
            .await
            .map_err(|e| failed(format!("transcode failed: {e}")))?;

        let key = format!("{channel_name}.mp3");
        self.storage
            .upload(&key, &output, "audio/mpeg")
            .await
            .map_err(|e| failed(format!("archive upload failed: {e}")))?;

        Ok(ArchivedRecording { key })
    }
}

/// Local file name for a segment URL: last path component, query stripped.
fn segment_file_name(url: &str, index: usize) -> PathBuf {
    let without_query = url.split('?').next().unwrap_or(url);
    let name = without_query
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("segment-{index}"));
    PathBuf::from(name)
}
