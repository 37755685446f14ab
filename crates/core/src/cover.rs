use std::path::Path;
use thiserror::Error;

use crate::extract::extract_response;
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::{ImageSynthesisError, ImageSynthesizer, LanguageModel, LanguageModelError};
use crate::prompts::{keys, PromptError, PromptRegistry};

#[derive(Debug, Error)]
pub enum CoverError {
    #[error("failed to render cover prompt: {0}")]
    Prompt(#[source] PromptError),
    #[error("language model call failed while describing the cover: {0}")]
    Model(#[source] LanguageModelError),
    #[error("cover description came back empty")]
    EmptyDescription,
    #[error("image synthesis failed: {0}")]
    Synthesis(#[source] ImageSynthesisError),
}

/// Turns an outline into an English art description, then into an image file.
pub struct CoverService<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
}

impl<'a> CoverService<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self { prompts, sink }
    }

    pub fn generate_cover_prompt<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        outline: &str,
    ) -> Result<String, CoverError> {
        let system = self
            .prompts
            .text(keys::COVER_DESIGNER_SYSTEM)
            .map_err(CoverError::Prompt)?;
        let prompt = self
            .prompts
            .format_with(keys::COVER_PROMPT, [("outline", outline)])
            .map_err(CoverError::Prompt)?;

        let raw = model.complete(&system, &prompt).map_err(CoverError::Model)?;
        let description = extract_response(&raw).trim().to_string();
        if description.is_empty() {
            return Err(CoverError::EmptyDescription);
        }
        self.log(LogLevel::Debug, format!("Cover description:\n{description}"));
        Ok(description)
    }

    pub fn create_cover<M, I>(
        &self,
        model: &M,
        synthesizer: &I,
        outline: &str,
        output_path: &Path,
    ) -> Result<(), CoverError>
    where
        M: LanguageModel + ?Sized,
        I: ImageSynthesizer + ?Sized,
    {
        let description = self.generate_cover_prompt(model, outline)?;
        synthesizer
            .synthesize_image(&description, output_path)
            .map_err(CoverError::Synthesis)?;
        self.log(
            LogLevel::Info,
            format!("Cover generated: {}", output_path.display()),
        );
        Ok(())
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}
