//! Small helpers shared across modules:
//! - string truncation for log previews
//! - output directory preparation

use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

/// Truncate a string for logging purposes.
///
/// Strings longer than `max` bytes are cut at the nearest character
/// boundary at or below `max`, with the number of dropped bytes appended.
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Create the parent directory of `path` if it does not exist yet.
///
/// A bare filename (no parent component) needs nothing.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).await?;
            debug!(dir = %parent.display(), "Output directory ready");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        // Each character is three bytes; a cut at 4 must back off to 3.
        let result = truncate_for_log("あいう", 4);
        assert_eq!(result, "あ…(+6 bytes)");
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_nested_dirs() {
        let root = std::env::temp_dir().join(format!("feed_narrator_utils_{}", std::process::id()));
        let target = root.join("a/b/out.wav");
        ensure_parent_dir(&target).await.unwrap();
        assert!(root.join("a/b").is_dir());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_accepts_bare_filename() {
        ensure_parent_dir(Path::new("out.wav")).await.unwrap();
    }
}
