use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chapter::Chapter;

pub const SAFE_TITLE_MAX_CHARS: usize = 50;
const SAFE_TITLE_EXTRA_CHARS: &str = "： -_.,()";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write `{path}`: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to build EPUB: {0}")]
    Epub(String),
}

/// Everything an exporter needs. Chapters are borrowed; exporters never
/// modify them.
#[derive(Clone, Copy, Debug)]
pub struct ExportRequest<'r> {
    pub title: &'r str,
    pub outline: &'r str,
    pub chapters: &'r [Chapter],
    pub author: &'r str,
    pub cover_image: Option<&'r Path>,
    pub output_dir: &'r Path,
    /// Filesystem-safe stem used for the output files.
    pub safe_title: &'r str,
}

pub trait NovelExporter: Send + Sync {
    fn export_markdown(&self, request: &ExportRequest<'_>) -> Result<PathBuf, ExportError>;

    fn export_epub(&self, request: &ExportRequest<'_>) -> Result<PathBuf, ExportError>;
}

/// Truncates `title` to `max_chars` characters and keeps only alphanumerics
/// and `： -_.,()`. Falls back to `novel` when nothing survives.
pub fn safe_filename(title: &str, max_chars: usize) -> String {
    let cleaned: String = title
        .chars()
        .take(max_chars)
        .filter(|c| c.is_alphanumeric() || SAFE_TITLE_EXTRA_CHARS.contains(*c))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "novel".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Creates `<base>/<YYYYmmdd_HHMMSS>_<8 hex chars>` and returns it.
pub fn unique_output_dir(base: &Path) -> io::Result<PathBuf> {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let dir = base.join(format!("{timestamp}_{}", &suffix[..8]));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn safe_filename_strips_path_characters() {
        assert_eq!(safe_filename("The Tide: A/B <Story>?", 50), "The Tide AB Story");
        assert_eq!(safe_filename("潮汐：序章 (上)", 50), "潮汐：序章 (上)");
        assert_eq!(safe_filename("///", 50), "novel");
    }

    #[test]
    fn safe_filename_truncates_by_characters() {
        let title = "é".repeat(80);
        assert_eq!(safe_filename(&title, 50).chars().count(), 50);
    }

    #[test]
    fn output_dirs_never_collide() {
        let base = tempdir().unwrap();
        let first = unique_output_dir(base.path()).unwrap();
        let second = unique_output_dir(base.path()).unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir());

        let name = first.file_name().unwrap().to_str().unwrap();
        let (stamp, suffix) = name.rsplit_once('_').unwrap();
        assert_eq!(stamp.len(), "20240101_120000".len());
        assert_eq!(suffix.len(), 8);
    }
}
