//! Output artifact and delivery.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use phoneframe_common::error::PhoneframeResult;

use crate::negotiate::{Container, NegotiatedCodec};

/// The finished recording: every encoder chunk concatenated in emission
/// order, tagged with the negotiated codec. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    bytes: Vec<u8>,
    mime: String,
    container: Container,
}

impl OutputArtifact {
    /// Concatenate `chunks` in order.
    pub fn from_chunks(chunks: Vec<Vec<u8>>, codec: &NegotiatedCodec) -> Self {
        let total = chunks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }
        Self {
            bytes,
            mime: codec.mime.clone(),
            container: codec.container,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn container(&self) -> Container {
        self.container
    }

    /// `base` plus the extension matching the container.
    pub fn suggested_filename(&self, base: &str) -> String {
        format!("{base}.{}", self.container.extension())
    }
}

/// Hands a finished artifact to the user.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Deliver `artifact` under `filename`, returning where it ended up.
    async fn deliver(&self, artifact: OutputArtifact, filename: &str) -> PhoneframeResult<PathBuf>;
}

/// Writes artifacts into a directory, never overwriting existing files.
#[derive(Debug, Clone)]
pub struct FileDownloadSink {
    dir: PathBuf,
}

impl FileDownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DownloadSink for FileDownloadSink {
    async fn deliver(&self, artifact: OutputArtifact, filename: &str) -> PhoneframeResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = available_path(&self.dir, filename).await;
        let len = artifact.len();
        tokio::fs::write(&path, artifact.into_bytes()).await?;
        tracing::info!(path = %path.display(), bytes = len, "Delivered recording");
        Ok(path)
    }
}

/// `dir/filename`, or `dir/stem (n).ext` if that name is taken.
async fn available_path(dir: &Path, filename: &str) -> PathBuf {
    let first = dir.join(filename);
    if !tokio::fs::try_exists(&first).await.unwrap_or(false) {
        return first;
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (filename, None),
    };
    let mut n = 1u32;
    loop {
        let candidate = match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        };
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webm() -> NegotiatedCodec {
        NegotiatedCodec {
            mime: "video/webm".to_string(),
            container: Container::Webm,
            bitrate_bps: 15_000_000,
        }
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let artifact = OutputArtifact::from_chunks(vec![vec![1, 2], vec![], vec![3]], &webm());
        assert_eq!(artifact.bytes(), &[1, 2, 3]);
        assert_eq!(artifact.mime(), "video/webm");
        assert_eq!(artifact.suggested_filename("phone-frame-4x3"), "phone-frame-4x3.webm");
    }

    #[tokio::test]
    async fn test_file_sink_never_overwrites() {
        let dir = std::env::temp_dir().join(format!("phoneframe-sink-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&dir).await;
        let sink = FileDownloadSink::new(&dir);

        let a = OutputArtifact::from_chunks(vec![vec![1]], &webm());
        let b = OutputArtifact::from_chunks(vec![vec![2]], &webm());
        let first = sink.deliver(a, "clip.webm").await.unwrap();
        let second = sink.deliver(b, "clip.webm").await.unwrap();

        assert_eq!(first, dir.join("clip.webm"));
        assert_eq!(second, dir.join("clip (1).webm"));
        assert_eq!(tokio::fs::read(&second).await.unwrap(), vec![2]);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
