use rand::seq::SliceRandom;
use std::ops::RangeInclusive;

use crate::extract::{extract_response, extract_tag};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::LanguageModel;
use crate::prompts::{keys, PromptRegistry};
use crate::styles::WritingStyle;

pub const CHAPTER_RANGE: RangeInclusive<u32> = 5..=15;
pub const DEFAULT_CHAPTER_COUNT: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoryParameters {
    pub style: WritingStyle,
    pub chapter_count: u32,
    pub explanation: Option<String>,
}

/// What the model proposed, before validation. Each field is `None` when it
/// was missing or outside the allowed values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProposedParameters {
    pub style: Option<WritingStyle>,
    pub chapter_count: Option<u32>,
    pub explanation: Option<String>,
}

pub fn parse_proposed_parameters(response: &str) -> ProposedParameters {
    let style = extract_tag(response, "style").trim().parse().ok();
    let chapter_count = extract_tag(response, "chapters")
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|count| CHAPTER_RANGE.contains(count));
    let explanation = Some(extract_tag(response, "explanation").trim())
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    ProposedParameters {
        style,
        chapter_count,
        explanation,
    }
}

pub struct ParameterService<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
}

impl<'a> ParameterService<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self { prompts, sink }
    }

    /// Caller overrides always win. With both supplied no call is made;
    /// otherwise the model proposes values, and each missing or invalid field
    /// falls back on its own: style to the override or a random catalog
    /// entry, chapter count to the override or [`DEFAULT_CHAPTER_COUNT`].
    pub fn determine<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        prompt: &str,
        style: Option<WritingStyle>,
        chapter_count: Option<u32>,
    ) -> StoryParameters {
        if let (Some(style), Some(chapter_count)) = (style, chapter_count) {
            return StoryParameters {
                style,
                chapter_count,
                explanation: None,
            };
        }

        let proposed = self.propose(model, prompt).unwrap_or_default();

        let style = style.or(proposed.style).unwrap_or_else(|| {
            self.log(LogLevel::Warn, "No valid style proposed, picking one at random");
            random_style()
        });
        let chapter_count = chapter_count.or(proposed.chapter_count).unwrap_or_else(|| {
            self.log(
                LogLevel::Warn,
                format!("No valid chapter count proposed, using {DEFAULT_CHAPTER_COUNT}"),
            );
            DEFAULT_CHAPTER_COUNT
        });

        self.log(
            LogLevel::Info,
            format!("Determined style: {style}, chapters: {chapter_count}"),
        );
        if let Some(explanation) = &proposed.explanation {
            self.log(LogLevel::Info, format!("Model explanation: {explanation}"));
        }

        StoryParameters {
            style,
            chapter_count,
            explanation: proposed.explanation,
        }
    }

    fn propose<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        prompt: &str,
    ) -> Option<ProposedParameters> {
        let rendered = self.prompts.text(keys::STYLE_AND_CHAPTERS_SYSTEM).and_then(|system| {
            self.prompts
                .format_with(
                    keys::STYLE_AND_CHAPTERS,
                    [
                        ("prompt", prompt.to_string()),
                        ("styles", WritingStyle::keys().join(", ")),
                        ("min_chapters", CHAPTER_RANGE.start().to_string()),
                        ("max_chapters", CHAPTER_RANGE.end().to_string()),
                    ],
                )
                .map(|user| (system, user))
        });
        let (system, user) = match rendered {
            Ok(pair) => pair,
            Err(err) => {
                self.log(LogLevel::Error, format!("Failed to render style prompt: {err}"));
                return None;
            }
        };

        match model.complete(&system, &user) {
            Ok(raw) => {
                self.log(LogLevel::Debug, format!("Style determination response:\n{raw}"));
                let proposed = parse_proposed_parameters(&extract_response(&raw));
                if proposed.style.is_none() {
                    self.log(LogLevel::Warn, "Invalid or missing style in model response");
                }
                if proposed.chapter_count.is_none() {
                    self.log(LogLevel::Warn, "Invalid or missing chapter count in model response");
                }
                Some(proposed)
            }
            Err(err) => {
                self.log(LogLevel::Warn, format!("Error in style determination: {err}"));
                None
            }
        }
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

fn random_style() -> WritingStyle {
    WritingStyle::ALL
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(WritingStyle::Literary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::VecLogSink;
    use crate::model::LanguageModelError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        reply: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(reply: &'static str) -> Self {
            Self {
                reply: Ok(reply),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("backend down"),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LanguageModel for Fixed {
        fn complete(&self, _system: &str, user: &str) -> Result<String, LanguageModelError> {
            assert!(user.contains("between 5 and 15"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .map_err(LanguageModelError::msg)
        }
    }

    fn determine(
        model: &Fixed,
        style: Option<WritingStyle>,
        count: Option<u32>,
    ) -> (StoryParameters, VecLogSink) {
        let prompts = PromptRegistry::new().unwrap();
        let sink = VecLogSink::new();
        let params = ParameterService::new(&prompts, &sink).determine(model, "a story", style, count);
        (params, sink)
    }

    #[test]
    fn both_overrides_skip_the_model() {
        let model = Fixed::failing();
        let (params, _) = determine(&model, Some(WritingStyle::Western), Some(3));
        assert_eq!(params.style, WritingStyle::Western);
        assert_eq!(params.chapter_count, 3);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn accepts_valid_proposal() {
        let model = Fixed::ok(
            "<response><style>horror</style><chapters>7</chapters><explanation>Dark prompt.</explanation></response>",
        );
        let (params, sink) = determine(&model, None, None);
        assert_eq!(params.style, WritingStyle::Horror);
        assert_eq!(params.chapter_count, 7);
        assert_eq!(params.explanation.as_deref(), Some("Dark prompt."));
        assert!(sink.contains(LogLevel::Info, "Determined style: horror, chapters: 7"));
    }

    #[test]
    fn invalid_fields_fall_back_independently() {
        let model = Fixed::ok("<response><style>space-opera</style><chapters>12</chapters></response>");
        let (params, _) = determine(&model, None, None);
        assert!(WritingStyle::ALL.contains(&params.style));
        assert_eq!(params.chapter_count, 12);

        let model = Fixed::ok("<response><style>crime</style><chapters>40</chapters></response>");
        let (params, _) = determine(&model, None, None);
        assert_eq!(params.style, WritingStyle::Crime);
        assert_eq!(params.chapter_count, DEFAULT_CHAPTER_COUNT);
    }

    #[test]
    fn overrides_beat_the_proposal() {
        let model = Fixed::ok("<response><style>crime</style><chapters>6</chapters></response>");
        let (params, _) = determine(&model, Some(WritingStyle::Poetry), None);
        assert_eq!(params.style, WritingStyle::Poetry);
        assert_eq!(params.chapter_count, 6);

        let (params, _) = determine(&model, None, Some(9));
        assert_eq!(params.style, WritingStyle::Crime);
        assert_eq!(params.chapter_count, 9);
    }

    #[test]
    fn backend_failure_never_leaves_the_valid_range() {
        for _ in 0..20 {
            let model = Fixed::failing();
            let (params, sink) = determine(&model, None, None);
            assert!(CHAPTER_RANGE.contains(&params.chapter_count));
            assert!(WritingStyle::ALL.contains(&params.style));
            assert!(sink.contains(LogLevel::Warn, "backend down"));
        }
    }

    #[test]
    fn chapter_count_must_be_a_single_number() {
        let parsed = parse_proposed_parameters("<chapters>5-8</chapters><style> Gothic </style>");
        assert_eq!(parsed.chapter_count, None);
        assert_eq!(parsed.style, Some(WritingStyle::Gothic));
    }
}
