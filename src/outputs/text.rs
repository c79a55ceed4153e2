//! Plain-text output: a file, or stdout when no path is configured.

use crate::error::{Error, Result};
use crate::utils::ensure_parent_dir;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// Writes the final text somewhere a human can read it.
pub trait TextSink {
    /// Write `text` to `destination`; an empty destination means stdout.
    async fn write(&self, destination: &str, text: &str) -> Result<()>;
}

impl<T: TextSink> TextSink for &T {
    async fn write(&self, destination: &str, text: &str) -> Result<()> {
        (**self).write(destination, text).await
    }
}

/// The default sink: files on the local filesystem, or stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

impl TextSink for FsSink {
    #[instrument(level = "info", skip(self, text), fields(chars = text.chars().count()))]
    async fn write(&self, destination: &str, text: &str) -> Result<()> {
        if destination.is_empty() {
            let mut stdout = tokio::io::stdout();
            let written = async {
                stdout.write_all(text.as_bytes()).await?;
                if !text.ends_with('\n') {
                    stdout.write_all(b"\n").await?;
                }
                stdout.flush().await
            };
            return written.await.map_err(|source| Error::SinkWrite {
                destination: "stdout".to_string(),
                source,
            });
        }

        let path = Path::new(destination);
        let sink_error = |source| Error::SinkWrite {
            destination: destination.to_string(),
            source,
        };
        ensure_parent_dir(path).await.map_err(sink_error)?;
        fs::write(path, text).await.map_err(sink_error)?;
        info!(path = %destination, "Wrote text output");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("feed_narrator_text_{tag}_{}", std::process::id()))
    }

    #[tokio::test]
    async fn test_writes_file_and_creates_parent() {
        let root = scratch_dir("write");
        let target = root.join("nested/script.md");
        FsSink
            .write(target.to_str().unwrap(), "# Title\n\nbody")
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "# Title\n\nbody");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_sink_error() {
        let root = scratch_dir("blocked");
        std::fs::create_dir_all(&root).unwrap();
        // A directory where the file should go.
        let err = FsSink.write(root.to_str().unwrap(), "x").await.unwrap_err();
        assert!(matches!(err, Error::SinkWrite { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }
}
