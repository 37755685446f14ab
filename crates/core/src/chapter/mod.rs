use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extract::extract_response;
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::LanguageModel;
use crate::prompts::{PromptError, PromptRegistry};
use crate::styles::WritingStyle;

mod prompt;
mod quality;

pub use quality::{GatedContent, QualityGate, DEFAULT_CHAPTER_ATTEMPTS, DEFAULT_MIN_CHAPTER_CHARS};

/// One planned chapter. `content` stays `None` until the chapter is written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    pub title: String,
    pub overview: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl Chapter {
    pub fn new(number: u32, title: impl Into<String>, overview: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            overview: overview.into(),
            content: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content
            .as_deref()
            .map_or(true, |content| content.trim().is_empty())
    }

    pub fn word_count(&self) -> usize {
        self.content
            .as_deref()
            .map_or(0, |content| content.split_whitespace().count())
    }

    /// The first `max_chars` characters of the content, cut back to a word
    /// boundary and suffixed with `...` when truncated.
    pub fn summary(&self, max_chars: usize) -> String {
        let Some(content) = self.content.as_deref().filter(|c| !c.trim().is_empty()) else {
            return "Empty chapter".to_string();
        };
        match content.char_indices().nth(max_chars) {
            None => content.to_string(),
            Some((cut, _)) => {
                let head = &content[..cut];
                let head = head.rsplit_once(' ').map_or(head, |(before, _)| before);
                format!("{head}...")
            }
        }
    }

    /// Placeholder stored when no attempt ever produced content.
    pub fn failure_sentinel(number: u32) -> String {
        format!("[Error: Content generation failed for Chapter {number}]")
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chapter {}: {}", self.number, self.title)
    }
}

/// Where a chapter sits in the book, with the text it continues from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChapterPosition<'p> {
    Opening,
    Continuation { previous: &'p str },
    Closing { previous: &'p str },
}

impl ChapterPosition<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Opening => "opening",
            Self::Continuation { .. } => "continuation",
            Self::Closing { .. } => "closing",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChapterError {
    #[error("failed to render {position} prompt for chapter {number}: {source}")]
    Prompt {
        number: u32,
        position: &'static str,
        #[source]
        source: PromptError,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct ChapterRequest<'r> {
    pub outline: &'r str,
    pub chapter: &'r Chapter,
    pub position: ChapterPosition<'r>,
    pub style: WritingStyle,
}

/// Writes chapter bodies. Upstream failures never escape: they are retried
/// by the gate and, at worst, replaced by the failure sentinel.
pub struct ChapterWriter<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
    gate: QualityGate,
}

impl<'a> ChapterWriter<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self {
            prompts,
            sink,
            gate: QualityGate::default(),
        }
    }

    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &QualityGate {
        &self.gate
    }

    pub fn write<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        request: &ChapterRequest<'_>,
    ) -> Result<GatedContent, ChapterError> {
        let number = request.chapter.number;
        let user_prompt =
            prompt::render_chapter_prompt(self.prompts, request).map_err(|source| {
                ChapterError::Prompt {
                    number,
                    position: request.position.label(),
                    source,
                }
            })?;
        let system_prompt = request.style.system_prompt();

        self.log(
            LogLevel::Info,
            format!("Writing chapter {number} ({})", request.position.label()),
        );

        let gated = self.gate.run(number, self.sink, |attempt| {
            self.log(
                LogLevel::Debug,
                format!("Chapter {number} prompt (attempt {attempt}):\n{user_prompt}"),
            );
            let raw = model.complete(system_prompt, &user_prompt)?;
            self.log(
                LogLevel::Debug,
                format!("Chapter {number} response (attempt {attempt}):\n{raw}"),
            );
            Ok(extract_response(&raw))
        });

        Ok(gated)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(content: &str) -> Chapter {
        Chapter {
            content: Some(content.to_string()),
            ..Chapter::new(3, "The Lantern", "Mara follows the light.")
        }
    }

    #[test]
    fn displays_number_and_title() {
        assert_eq!(written("x").to_string(), "Chapter 3: The Lantern");
    }

    #[test]
    fn emptiness_and_word_count() {
        let stub = Chapter::new(1, "t", "o");
        assert!(stub.is_empty());
        assert_eq!(stub.word_count(), 0);
        assert!(written("  \n ").is_empty());
        assert_eq!(written("one two\nthree").word_count(), 3);
    }

    #[test]
    fn summary_cuts_at_word_boundary() {
        let chapter = written("The tide came in slowly over the rocks");
        assert_eq!(chapter.summary(100), "The tide came in slowly over the rocks");
        assert_eq!(chapter.summary(12), "The tide...");
        assert_eq!(Chapter::new(1, "t", "o").summary(10), "Empty chapter");
    }

    #[test]
    fn summary_counts_characters_not_bytes() {
        let chapter = written("潮水慢慢涨上来了");
        assert_eq!(chapter.summary(4), "潮水慢慢...");
    }

    #[test]
    fn sentinel_names_the_chapter() {
        assert_eq!(
            Chapter::failure_sentinel(7),
            "[Error: Content generation failed for Chapter 7]"
        );
    }

    #[test]
    fn deserializes_without_content() {
        let chapter: Chapter =
            serde_json::from_str(r#"{"number":2,"title":"Ash","overview":"Smoke rises."}"#)
                .unwrap();
        assert_eq!(chapter.content, None);
    }
}
