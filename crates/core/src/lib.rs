pub mod chapter;
pub mod config;
pub mod cover;
pub mod export;
pub mod extract;
pub mod logging;
pub mod model;
pub mod novel;
pub mod outline;
pub mod plan;
pub mod prompts;
pub mod styles;
pub mod translate;

pub use chapter::{
    Chapter, ChapterError, ChapterPosition, ChapterRequest, ChapterWriter, GatedContent,
    QualityGate, DEFAULT_CHAPTER_ATTEMPTS, DEFAULT_MIN_CHAPTER_CHARS,
};
pub use config::{Config, ConfigError, GenerationConfig, ImageConfig, LlmConfig, PromptConfig};
pub use cover::{CoverError, CoverService};
pub use export::{
    safe_filename, unique_output_dir, ExportError, ExportRequest, NovelExporter,
    SAFE_TITLE_MAX_CHARS,
};
pub use extract::{extract_response, extract_tag, strip_reasoning};
pub use logging::{
    FanoutLogSink, FileLogSink, LogLevel, LogRecord, LogSink, NullLogSink, SharedLogSink,
    SinkLogger, StdoutLogSink, VecLogSink,
};
pub use model::{ImageSynthesisError, ImageSynthesizer, LanguageModel, LanguageModelError};
pub use novel::{
    GeneratedFiles, GenerationRequest, GenerationResult, NovelError, NovelGenerator,
    ParameterService, StoryParameters,
};
pub use outline::{OutlineError, OutlineService, OutlineStep, StoryOutline};
pub use plan::{parse_chapter_plan, ChapterPlanService, ParsedPlan};
pub use prompts::{PromptArguments, PromptError, PromptRegistry, PromptSource, PromptTemplate};
pub use styles::{StyleParseError, StyleProfile, WritingStyle};
pub use translate::{is_same_language, TranslateError, TranslationRequest, Translator};
