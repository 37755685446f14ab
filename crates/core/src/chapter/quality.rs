use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::LanguageModelError;

use super::Chapter;

pub const DEFAULT_MIN_CHAPTER_CHARS: usize = 1000;
pub const DEFAULT_CHAPTER_ATTEMPTS: usize = 3;

/// Advisory length threshold with a bounded number of attempts.
///
/// Length is counted in characters. Attempts stop at the first result that
/// reaches `min_chars`; otherwise the last non-empty result is kept. Only when
/// no attempt ever produced text does the chapter get the failure sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityGate {
    pub min_chars: usize,
    pub max_attempts: usize,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CHAPTER_CHARS,
            max_attempts: DEFAULT_CHAPTER_ATTEMPTS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatedContent {
    pub content: String,
    pub attempts: usize,
    pub met_threshold: bool,
}

impl GatedContent {
    pub fn is_sentinel(&self, number: u32) -> bool {
        self.content == Chapter::failure_sentinel(number)
    }
}

impl QualityGate {
    pub fn new(min_chars: usize, max_attempts: usize) -> Self {
        Self {
            min_chars,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn run<F>(&self, chapter: u32, sink: &dyn LogSink, mut generate: F) -> GatedContent
    where
        F: FnMut(usize) -> Result<String, LanguageModelError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut best: Option<String> = None;

        for attempt in 1..=max_attempts {
            let length = match generate(attempt) {
                Ok(content) if !content.trim().is_empty() => {
                    let length = content.chars().count();
                    if length >= self.min_chars {
                        return GatedContent {
                            content,
                            attempts: attempt,
                            met_threshold: true,
                        };
                    }
                    best = Some(content);
                    length
                }
                Ok(_) => 0,
                Err(err) => {
                    log(
                        sink,
                        LogLevel::Error,
                        format!("Error writing chapter {chapter} (attempt {attempt}/{max_attempts}): {err}"),
                    );
                    continue;
                }
            };

            if attempt < max_attempts {
                log(
                    sink,
                    LogLevel::Warn,
                    format!(
                        "Chapter {chapter} length insufficient ({length} < {}), retry {attempt}/{max_attempts}",
                        self.min_chars
                    ),
                );
            } else if best.is_some() {
                log(
                    sink,
                    LogLevel::Warn,
                    format!(
                        "Chapter {chapter} still below {} characters after {max_attempts} attempts, keeping the last draft",
                        self.min_chars
                    ),
                );
            }
        }

        match best {
            Some(content) => GatedContent {
                content,
                attempts: max_attempts,
                met_threshold: false,
            },
            None => {
                log(
                    sink,
                    LogLevel::Error,
                    format!("Failed to generate content for chapter {chapter} after {max_attempts} attempts"),
                );
                GatedContent {
                    content: Chapter::failure_sentinel(chapter),
                    attempts: max_attempts,
                    met_threshold: false,
                }
            }
        }
    }
}

fn log(sink: &dyn LogSink, level: LogLevel, message: String) {
    sink.log(LogRecord::new(level, message));
}
