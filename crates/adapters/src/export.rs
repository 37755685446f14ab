use std::fs;
use std::path::{Path, PathBuf};

use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use log::{info, warn};

use novelist_core::{Chapter, ExportError, ExportRequest, NovelExporter};

const STYLESHEET: &str = include_str!("../assets/epub.css");
const MAX_CHAPTER_TITLE_CHARS: usize = 100;

/// Writes `<safe_title>.md` and `<safe_title>.epub` into the run directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileExporter;

impl FileExporter {
    pub fn new() -> Self {
        Self
    }
}

impl NovelExporter for FileExporter {
    fn export_markdown(&self, request: &ExportRequest<'_>) -> Result<PathBuf, ExportError> {
        let path = request.output_dir.join(format!("{}.md", request.safe_title));
        fs::write(&path, render_markdown(request.title, request.chapters)).map_err(|source| {
            ExportError::Write {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }

    /// Falls back to `novel_<timestamp>.epub` once when the titled file
    /// cannot be written.
    fn export_epub(&self, request: &ExportRequest<'_>) -> Result<PathBuf, ExportError> {
        let path = request.output_dir.join(format!("{}.epub", request.safe_title));
        match write_epub(&mut build_epub(request)?, &path) {
            Ok(()) => {
                info!("EPUB file generated: {}", path.display());
                Ok(path)
            }
            Err(err) => {
                warn!("Error writing EPUB file {}: {err}", path.display());
                let fallback = request.output_dir.join(format!(
                    "novel_{}.epub",
                    chrono::Local::now().format("%Y%m%d_%H%M%S")
                ));
                write_epub(&mut build_epub(request)?, &fallback)?;
                info!("EPUB file generated with fallback name: {}", fallback.display());
                Ok(fallback)
            }
        }
    }
}

pub fn render_markdown(title: &str, chapters: &[Chapter]) -> String {
    let mut markdown = format!("# {title}\n\n");
    for chapter in chapters {
        markdown.push_str(&format!(
            "## Chapter {}: {}\n\n{}\n\n",
            chapter.number,
            chapter.title,
            chapter.content.as_deref().unwrap_or_default()
        ));
    }
    markdown
}

fn epub_error(err: impl std::fmt::Display) -> ExportError {
    ExportError::Epub(err.to_string())
}

fn build_epub(request: &ExportRequest<'_>) -> Result<EpubBuilder<ZipLibrary>, ExportError> {
    let today = chrono::Local::now().format("%Y-%m-%d");
    let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(epub_error)?).map_err(epub_error)?;
    builder
        .metadata("title", request.title)
        .and_then(|b| b.metadata("author", request.author))
        .and_then(|b| b.metadata("lang", "en"))
        .and_then(|b| b.metadata("description", format!("Generated by Novelist - {today}")))
        .and_then(|b| b.metadata("license", "All rights reserved"))
        .and_then(|b| b.metadata("generator", "novelist"))
        .map_err(epub_error)?;
    builder.stylesheet(STYLESHEET.as_bytes()).map_err(epub_error)?;

    if let Some(cover) = request.cover_image {
        add_cover(&mut builder, cover)?;
    } else {
        info!("No cover image provided");
    }

    for (index, chapter) in request.chapters.iter().enumerate() {
        let title = truncate_title(&chapter.title);
        let xhtml = chapter_xhtml(chapter, &title);
        builder
            .add_content(
                EpubContent::new(format!("chapter_{}.xhtml", index + 1), xhtml.as_bytes())
                    .title(format!("Chapter {}: {title}", chapter.number))
                    .reftype(ReferenceType::Text),
            )
            .map_err(epub_error)?;
    }
    builder.inline_toc();
    Ok(builder)
}

/// Missing or empty cover files are skipped with a warning.
fn add_cover(builder: &mut EpubBuilder<ZipLibrary>, cover: &Path) -> Result<(), ExportError> {
    let bytes = match fs::read(cover) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            warn!("Cover image {} is empty, skipping", cover.display());
            return Ok(());
        }
        Err(err) => {
            warn!("Failed to add cover image {}: {err}", cover.display());
            return Ok(());
        }
    };

    let extension = cover
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png")
        .to_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    };
    builder
        .add_cover_image(format!("cover.{extension}"), bytes.as_slice(), mime)
        .map_err(epub_error)?;
    info!("Added cover image from: {}", cover.display());
    Ok(())
}

/// The archive is assembled in memory, so a build failure never touches
/// `path`. A failed write removes whatever part of the file was created.
fn write_epub(builder: &mut EpubBuilder<ZipLibrary>, path: &Path) -> Result<(), ExportError> {
    let mut archive = Vec::new();
    builder.generate(&mut archive).map_err(epub_error)?;
    fs::write(path, &archive).map_err(|source| {
        if path.is_file() {
            let _ = fs::remove_file(path);
        }
        ExportError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() > MAX_CHAPTER_TITLE_CHARS {
        let head: String = title.chars().take(MAX_CHAPTER_TITLE_CHARS - 3).collect();
        format!("{head}...")
    } else {
        title.to_string()
    }
}

fn chapter_xhtml(chapter: &Chapter, title: &str) -> String {
    let paragraphs: String = chapter
        .content
        .as_deref()
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("<p class=\"paragraph\">{}</p>\n", html_escape::encode_text(line)))
        .collect();
    let title = html_escape::encode_text(title);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en">
<head>
<title>{title}</title>
<link rel="stylesheet" type="text/css" href="stylesheet.css"/>
</head>
<body>
<div class="chapter">
<h1 class="chapter-title">Chapter {number}</h1>
<h2 class="chapter-subtitle">{title}</h2>
<div class="chapter-content">
{paragraphs}</div>
</div>
</body>
</html>
"#,
        number = chapter.number,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chapters() -> Vec<Chapter> {
        vec![
            Chapter {
                content: Some("Mara steps ashore.\n\n  The gulls <scream>.  \n".to_string()),
                ..Chapter::new(1, "Arrival", "Mara arrives.")
            },
            Chapter {
                content: Some("The lamp burns.".to_string()),
                ..Chapter::new(2, "Light", "The end.")
            },
        ]
    }

    fn request<'r>(dir: &'r Path, chapters: &'r [Chapter], cover: Option<&'r Path>) -> ExportRequest<'r> {
        ExportRequest {
            title: "The Quiet Tide",
            outline: "outline",
            chapters,
            author: "Tester",
            cover_image: cover,
            output_dir: dir,
            safe_title: "The Quiet Tide",
        }
    }

    #[test]
    fn markdown_lists_chapters_in_order() {
        let markdown = render_markdown("The Quiet Tide", &chapters());
        assert!(markdown.starts_with("# The Quiet Tide\n\n## Chapter 1: Arrival\n\nMara steps ashore."));
        assert!(markdown.contains("## Chapter 2: Light\n\nThe lamp burns.\n\n"));
        let first = markdown.find("Chapter 1").unwrap();
        let second = markdown.find("Chapter 2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn writes_markdown_file() {
        let dir = tempdir().unwrap();
        let chapters = chapters();
        let path = FileExporter::new()
            .export_markdown(&request(dir.path(), &chapters, None))
            .unwrap();
        assert_eq!(path, dir.path().join("The Quiet Tide.md"));
        assert!(fs::read_to_string(path).unwrap().contains("The lamp burns."));
    }

    #[test]
    fn writes_epub_with_and_without_cover() {
        let dir = tempdir().unwrap();
        let chapters = chapters();

        let path = FileExporter::new()
            .export_epub(&request(dir.path(), &chapters, None))
            .unwrap();
        assert_eq!(path, dir.path().join("The Quiet Tide.epub"));
        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK"));

        let empty_cover = dir.path().join("cover.png");
        fs::write(&empty_cover, b"").unwrap();
        let path = FileExporter::new()
            .export_epub(&request(dir.path(), &chapters, Some(&empty_cover)))
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_title_falls_back_to_timestamp_name() {
        let dir = tempdir().unwrap();
        let chapters = chapters();
        let request = ExportRequest {
            safe_title: "missing/subdir",
            ..request(dir.path(), &chapters, None)
        };

        let path = FileExporter::new().export_epub(&request).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("novel_") && name.ends_with(".epub"), "{name}");
        assert_eq!(path.parent(), Some(dir.path()));
    }

    #[test]
    fn fallback_leaves_no_partial_titled_file() {
        let dir = tempdir().unwrap();
        let chapters = chapters();
        // A directory squatting on the titled name makes that write fail.
        fs::create_dir(dir.path().join("The Quiet Tide.epub")).unwrap();

        let path = FileExporter::new()
            .export_epub(&request(dir.path(), &chapters, None))
            .unwrap();

        let epub_files: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "epub"))
            .collect();
        assert_eq!(epub_files, vec![path.clone()]);
        assert!(fs::read(&path).unwrap().starts_with(b"PK"));
        assert!(dir.path().join("The Quiet Tide.epub").is_dir());
    }

    #[test]
    fn chapter_markup_escapes_text_and_skips_blank_lines() {
        let chapter = &chapters()[0];
        let xhtml = chapter_xhtml(chapter, "Arrival");
        assert!(xhtml.contains("<h1 class=\"chapter-title\">Chapter 1</h1>"));
        assert!(xhtml.contains("<p class=\"paragraph\">The gulls &lt;scream&gt;.</p>"));
        assert_eq!(xhtml.matches("<p class=\"paragraph\">").count(), 2);
    }

    #[test]
    fn long_titles_are_shortened() {
        let title = "x".repeat(120);
        let short = truncate_title(&title);
        assert_eq!(short.chars().count(), 100);
        assert!(short.ends_with("..."));
        assert_eq!(truncate_title("Arrival"), "Arrival");
    }
}
