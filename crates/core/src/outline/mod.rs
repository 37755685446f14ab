use std::fmt;
use thiserror::Error;

use crate::extract::extract_response;
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::{LanguageModel, LanguageModelError};
use crate::prompts::{keys, PromptError, PromptRegistry};
use crate::styles::WritingStyle;

pub const OUTLINE_CANDIDATES: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OutlineStep {
    Candidates,
    Select,
    Refine,
    Title,
}

impl OutlineStep {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Candidates => "outline candidates",
            Self::Select => "outline selection",
            Self::Refine => "outline refinement",
            Self::Title => "story title",
        }
    }

    fn prompt_key(&self) -> &'static str {
        match self {
            Self::Candidates => keys::OUTLINE_CANDIDATES,
            Self::Select => keys::SELECT_OUTLINE,
            Self::Refine => keys::REFINE_OUTLINE,
            Self::Title => keys::STORY_TITLE,
        }
    }
}

impl fmt::Display for OutlineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("failed to render prompt for {step}: {source}")]
    Prompt {
        step: OutlineStep,
        #[source]
        source: PromptError,
    },
    #[error("language model call failed for {step}: {source}")]
    Model {
        step: OutlineStep,
        #[source]
        source: LanguageModelError,
    },
    #[error("{step} returned no <response> content")]
    EmptyResponse { step: OutlineStep },
}

impl OutlineError {
    pub fn step(&self) -> OutlineStep {
        match self {
            Self::Prompt { step, .. } | Self::Model { step, .. } | Self::EmptyResponse { step } => {
                *step
            }
        }
    }
}

/// Everything the outline steps produced. Only `refined` and `title` feed
/// later stages; the intermediates are kept for logging and inspection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoryOutline {
    pub candidates: String,
    pub selected: String,
    pub refined: String,
    pub title: String,
}

/// Candidates, then select/merge, then refine, then title. Each step is one
/// completion call whose `<response>` field feeds the next step.
///
/// By default an empty `<response>` is carried forward as empty input (and
/// logged); `with_strict(true)` turns it into [`OutlineError::EmptyResponse`].
pub struct OutlineService<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
    strict: bool,
}

impl<'a> OutlineService<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self {
            prompts,
            sink,
            strict: false,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn generate<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        prompt: &str,
        style: WritingStyle,
    ) -> Result<StoryOutline, OutlineError> {
        let candidates = self.generate_candidates(model, prompt, style)?;
        self.log(LogLevel::Info, "Generated story outlines");

        let selected = self.select_outline(model, &candidates, style)?;
        self.log(LogLevel::Info, "Selected best outline");

        let refined = self.refine_outline(model, &selected, style)?;
        self.log(LogLevel::Info, "Refined outline");

        let title = self.generate_title(model, &refined, style)?;
        self.log(LogLevel::Info, format!("Generated title: {title}"));

        Ok(StoryOutline {
            candidates,
            selected,
            refined,
            title,
        })
    }

    /// Raw text holding the labelled candidates; not split further.
    pub fn generate_candidates<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        prompt: &str,
        style: WritingStyle,
    ) -> Result<String, OutlineError> {
        self.run_step(
            model,
            OutlineStep::Candidates,
            style,
            [
                ("candidate_count", OUTLINE_CANDIDATES.to_string()),
                ("style_name", style.name().to_string()),
                ("prompt", prompt.to_string()),
            ],
        )
    }

    pub fn select_outline<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        candidates: &str,
        style: WritingStyle,
    ) -> Result<String, OutlineError> {
        self.run_step(
            model,
            OutlineStep::Select,
            style,
            [("candidates", candidates.to_string())],
        )
    }

    pub fn refine_outline<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        outline: &str,
        style: WritingStyle,
    ) -> Result<String, OutlineError> {
        self.run_step(
            model,
            OutlineStep::Refine,
            style,
            [("outline", outline.to_string())],
        )
    }

    pub fn generate_title<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        outline: &str,
        style: WritingStyle,
    ) -> Result<String, OutlineError> {
        self.run_step(
            model,
            OutlineStep::Title,
            style,
            [("outline", outline.to_string())],
        )
        .map(|title| title.trim().to_string())
    }

    fn run_step<M, const N: usize>(
        &self,
        model: &M,
        step: OutlineStep,
        style: WritingStyle,
        arguments: [(&str, String); N],
    ) -> Result<String, OutlineError>
    where
        M: LanguageModel + ?Sized,
    {
        let prompt = self
            .prompts
            .format_with(step.prompt_key(), arguments)
            .map_err(|source| OutlineError::Prompt { step, source })?;

        self.log(LogLevel::Debug, format!("Prompt for {step}:\n{prompt}"));
        let raw = model
            .complete(style.system_prompt(), &prompt)
            .map_err(|source| OutlineError::Model { step, source })?;
        self.log(LogLevel::Debug, format!("Response for {step}:\n{raw}"));

        let response = extract_response(&raw);
        if response.trim().is_empty() {
            if self.strict {
                return Err(OutlineError::EmptyResponse { step });
            }
            self.log(
                LogLevel::Warn,
                format!("{step} returned no <response> content, continuing with empty text"),
            );
        }
        Ok(response)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::VecLogSink;
    use std::sync::Mutex;

    struct Scripted {
        responses: Mutex<Vec<&'static str>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<&'static str>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl LanguageModel for Scripted {
        fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
        ) -> Result<String, LanguageModelError> {
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .map(str::to_string)
                .ok_or_else(|| LanguageModelError::msg("no scripted response"))
        }
    }

    #[test]
    fn chains_each_step_into_the_next() {
        let model = Scripted::new(vec![
            "<response><outline 1>a</outline 1></response>",
            "<response>CHOSEN</response>",
            "<response>REFINED</response>",
            "<response>\n  The Quiet Tide \n</response>",
        ]);
        let prompts = PromptRegistry::new().unwrap();
        let sink = VecLogSink::new();

        let outline = OutlineService::new(&prompts, &sink)
            .generate(&model, "a lighthouse story", WritingStyle::Mystery)
            .unwrap();

        assert_eq!(outline.selected, "CHOSEN");
        assert_eq!(outline.refined, "REFINED");
        assert_eq!(outline.title, "The Quiet Tide");

        let seen = model.prompts.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[0].contains("Generate 5 Mystery story outlines"));
        assert!(seen[0].contains("a lighthouse story"));
        assert!(seen[1].contains("<outline 1>a</outline 1>"));
        assert!(seen[2].contains("CHOSEN"));
        assert!(seen[3].contains("REFINED"));
    }

    #[test]
    fn permissive_mode_carries_empty_text_forward() {
        let model = Scripted::new(vec![
            "no tags at all",
            "<response>picked</response>",
            "<response>better</response>",
            "<response>Title</response>",
        ]);
        let prompts = PromptRegistry::new().unwrap();
        let sink = VecLogSink::new();

        let outline = OutlineService::new(&prompts, &sink)
            .generate(&model, "prompt", WritingStyle::Fantasy)
            .unwrap();

        assert_eq!(outline.candidates, "");
        assert_eq!(outline.title, "Title");
        assert!(sink.contains(LogLevel::Warn, "outline candidates returned no <response>"));
    }

    #[test]
    fn strict_mode_stops_at_the_empty_step() {
        let model = Scripted::new(vec!["<response>cands</response>", "<response>  </response>"]);
        let prompts = PromptRegistry::new().unwrap();
        let sink = VecLogSink::new();

        let error = OutlineService::new(&prompts, &sink)
            .with_strict(true)
            .generate(&model, "prompt", WritingStyle::Fantasy)
            .unwrap_err();

        assert_eq!(error.step(), OutlineStep::Select);
        assert!(matches!(error, OutlineError::EmptyResponse { .. }));
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[test]
    fn backend_failure_names_the_step() {
        let model = Scripted::new(vec!["<response>cands</response>"]);
        let prompts = PromptRegistry::new().unwrap();
        let sink = VecLogSink::new();

        let error = OutlineService::new(&prompts, &sink)
            .generate(&model, "prompt", WritingStyle::Fantasy)
            .unwrap_err();

        assert!(matches!(
            error,
            OutlineError::Model {
                step: OutlineStep::Select,
                ..
            }
        ));
    }
}
