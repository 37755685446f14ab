use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chapter::{Chapter, ChapterError, ChapterPosition, ChapterRequest, ChapterWriter, QualityGate};
use crate::config::GenerationConfig;
use crate::cover::CoverService;
use crate::export::{safe_filename, unique_output_dir, ExportError, ExportRequest, NovelExporter, SAFE_TITLE_MAX_CHARS};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::{ImageSynthesizer, LanguageModel, LanguageModelError};
use crate::outline::{OutlineError, OutlineService};
use crate::plan::ChapterPlanService;
use crate::prompts::PromptRegistry;
use crate::styles::WritingStyle;

mod parameters;

pub use parameters::{
    parse_proposed_parameters, ParameterService, ProposedParameters, StoryParameters,
    CHAPTER_RANGE, DEFAULT_CHAPTER_COUNT,
};

const UNTITLED: &str = "Untitled";

#[derive(Debug, Error)]
pub enum NovelError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{stage} failed: {source}")]
    Upstream {
        stage: &'static str,
        #[source]
        source: LanguageModelError,
    },
    #[error(transparent)]
    Outline(OutlineError),
    #[error("chapter planning produced no usable chapters (requested {requested})")]
    PlanningFailed { requested: u32 },
    #[error(transparent)]
    Chapter(#[from] ChapterError),
    #[error("failed to create output directory under `{path}`: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("EPUB export failed: {0}")]
    ExportFailed(#[source] ExportError),
}

impl From<OutlineError> for NovelError {
    fn from(error: OutlineError) -> Self {
        match error {
            OutlineError::Model { step, source } => Self::Upstream {
                stage: step.label(),
                source,
            },
            OutlineError::EmptyResponse { step } => Self::Upstream {
                stage: step.label(),
                source: LanguageModelError::msg("model returned no <response> content"),
            },
            other => Self::Outline(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub chapter_count: Option<u32>,
    pub style: Option<WritingStyle>,
    pub output_dir: PathBuf,
    pub author: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            chapter_count: None,
            style: None,
            output_dir: PathBuf::from("output"),
            author: "AI".to_string(),
        }
    }

    pub fn with_chapter_count(mut self, chapter_count: Option<u32>) -> Self {
        self.chapter_count = chapter_count;
        self
    }

    pub fn with_style(mut self, style: Option<WritingStyle>) -> Self {
        self.style = style;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedFiles {
    pub epub: Option<PathBuf>,
    pub markdown: Option<PathBuf>,
    pub cover: Option<PathBuf>,
}

/// Terminal outcome of a run, serialized as
/// `{"status": "success", ...}` or `{"status": "error", "message": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GenerationResult {
    Success {
        title: String,
        output_dir: PathBuf,
        files: GeneratedFiles,
    },
    Error {
        message: String,
    },
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn files(&self) -> Option<&GeneratedFiles> {
        match self {
            Self::Success { files, .. } => Some(files),
            Self::Error { .. } => None,
        }
    }
}

/// Sequences parameters, outline, plan, chapters, cover and export into one
/// run. Every collaborator is borrowed for the lifetime of the generator.
pub struct NovelGenerator<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
    model: &'a dyn LanguageModel,
    images: Option<&'a dyn ImageSynthesizer>,
    exporter: &'a dyn NovelExporter,
    gate: QualityGate,
    strict_outline: bool,
}

impl<'a> NovelGenerator<'a> {
    pub fn new(
        prompts: &'a PromptRegistry,
        sink: &'a dyn LogSink,
        model: &'a dyn LanguageModel,
        exporter: &'a dyn NovelExporter,
    ) -> Self {
        Self {
            prompts,
            sink,
            model,
            images: None,
            exporter,
            gate: QualityGate::default(),
            strict_outline: false,
        }
    }

    /// Without an image backend the cover stage is skipped.
    pub fn with_images(mut self, images: Option<&'a dyn ImageSynthesizer>) -> Self {
        self.images = images;
        self
    }

    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    /// In strict mode an empty outline step fails the run as an upstream
    /// error naming the step.
    pub fn with_strict_outline(mut self, strict: bool) -> Self {
        self.strict_outline = strict;
        self
    }

    pub fn with_generation_config(self, config: &GenerationConfig) -> Self {
        self.with_gate(QualityGate::new(config.min_chapter_chars, config.chapter_attempts))
            .with_strict_outline(config.strict_outline)
    }

    /// Runs the whole pipeline. Failures are reported in the returned
    /// [`GenerationResult`]; this never returns an error or panics on
    /// collaborator failure.
    pub fn generate_novel(&self, request: &GenerationRequest) -> GenerationResult {
        match self.run(request) {
            Ok(result) => result,
            Err(err) => {
                self.log(LogLevel::Error, format!("Error generating novel: {err}"));
                GenerationResult::Error {
                    message: err.to_string(),
                }
            }
        }
    }

    fn run(&self, request: &GenerationRequest) -> Result<GenerationResult, NovelError> {
        if request.prompt.trim().is_empty() {
            return Err(NovelError::InvalidInput("story prompt is empty".to_string()));
        }
        if request.chapter_count == Some(0) {
            return Err(NovelError::InvalidInput(
                "chapter count must be at least 1".to_string(),
            ));
        }

        let StoryParameters {
            style,
            chapter_count,
            ..
        } = ParameterService::new(self.prompts, self.sink).determine(
            self.model,
            &request.prompt,
            request.style,
            request.chapter_count,
        );

        let output_dir =
            unique_output_dir(&request.output_dir).map_err(|source| NovelError::OutputDir {
                path: request.output_dir.clone(),
                source,
            })?;
        self.log(
            LogLevel::Info,
            format!("Output directory: {}", output_dir.display()),
        );

        let outline = OutlineService::new(self.prompts, self.sink)
            .with_strict(self.strict_outline)
            .generate(self.model, &request.prompt, style)?;
        let title = if outline.title.is_empty() {
            self.log(LogLevel::Warn, format!("Empty story title, using \"{UNTITLED}\""));
            UNTITLED.to_string()
        } else {
            outline.title.clone()
        };

        let mut chapters = ChapterPlanService::new(self.prompts, self.sink)
            .plan_chapters(self.model, &outline.refined, chapter_count, style)
            .filter(|chapters| !chapters.is_empty())
            .ok_or(NovelError::PlanningFailed {
                requested: chapter_count,
            })?;
        self.log(
            LogLevel::Info,
            format!("Planned {} chapters", chapters.len()),
        );

        self.write_chapters(&mut chapters, &outline.refined, style)?;

        let cover = self.generate_cover(&outline.refined, &output_dir);

        let safe_title = safe_filename(&title, SAFE_TITLE_MAX_CHARS);
        let export = ExportRequest {
            title: &title,
            outline: &outline.refined,
            chapters: &chapters,
            author: &request.author,
            cover_image: cover.as_deref(),
            output_dir: &output_dir,
            safe_title: &safe_title,
        };

        let markdown = match self.exporter.export_markdown(&export) {
            Ok(path) => {
                self.log(LogLevel::Info, format!("Markdown saved: {}", path.display()));
                Some(path)
            }
            Err(err) => {
                self.log(LogLevel::Error, format!("Failed to save Markdown: {err}"));
                None
            }
        };
        let epub = self
            .exporter
            .export_epub(&export)
            .map_err(NovelError::ExportFailed)?;
        self.log(LogLevel::Info, format!("EPUB saved: {}", epub.display()));

        Ok(GenerationResult::Success {
            title,
            output_dir,
            files: GeneratedFiles {
                epub: Some(epub).filter(|path| path.exists()),
                markdown: markdown.filter(|path| path.exists()),
                cover,
            },
        })
    }

    /// Fills every chapter left to right; each non-opening chapter sees the
    /// finished text of the one before it.
    fn write_chapters(
        &self,
        chapters: &mut [Chapter],
        outline: &str,
        style: WritingStyle,
    ) -> Result<(), NovelError> {
        let writer = ChapterWriter::new(self.prompts, self.sink).with_gate(self.gate);
        let last = chapters.len().saturating_sub(1);

        for index in 0..chapters.len() {
            let (done, rest) = chapters.split_at_mut(index);
            let chapter = &mut rest[0];
            let previous = done
                .last()
                .and_then(|chapter| chapter.content.as_deref())
                .unwrap_or_default();
            let position = match index {
                0 => ChapterPosition::Opening,
                i if i == last => ChapterPosition::Closing { previous },
                _ => ChapterPosition::Continuation { previous },
            };

            let gated = writer.write(
                self.model,
                &ChapterRequest {
                    outline,
                    chapter: &*chapter,
                    position,
                    style,
                },
            )?;
            self.log(
                LogLevel::Info,
                format!(
                    "Generated chapter {} ({} chars, {} attempt(s))",
                    chapter.number,
                    gated.content.chars().count(),
                    gated.attempts
                ),
            );
            chapter.content = Some(gated.content);
        }
        Ok(())
    }

    /// Best effort: any failure is logged and the run continues without a
    /// cover. Returns the path only when a non-empty file was written.
    fn generate_cover(&self, outline: &str, output_dir: &Path) -> Option<PathBuf> {
        let images = self.images?;
        let path = output_dir.join(format!("cover.{}", images.file_extension()));

        if let Err(err) =
            CoverService::new(self.prompts, self.sink).create_cover(self.model, images, outline, &path)
        {
            self.log(LogLevel::Error, format!("Failed to generate cover: {err}"));
            self.log(LogLevel::Info, "Continuing without cover image");
            return None;
        }

        match fs::metadata(&path) {
            Ok(metadata) if metadata.len() > 0 => Some(path),
            _ => {
                self.log(
                    LogLevel::Warn,
                    format!("Cover image missing or empty at {}", path.display()),
                );
                None
            }
        }
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}
