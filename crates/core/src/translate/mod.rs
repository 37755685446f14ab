use std::collections::BTreeMap;
use thiserror::Error;

use crate::extract::extract_response;
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::{LanguageModel, LanguageModelError};
use crate::prompts::{keys, PromptError, PromptRegistry};

/// Only this many leading characters are sent for language detection.
pub const DETECTION_SAMPLE_CHARS: usize = 500;

/// ISO code followed by the names that refer to the same language.
const LANGUAGE_SYNONYMS: &[(&str, &[&str])] = &[
    ("zh", &["chinese", "mandarin", "中文", "汉语", "普通话"]),
    ("en", &["english", "英语", "英文"]),
    ("fr", &["french", "français", "法语", "法文"]),
    ("es", &["spanish", "español", "西班牙语"]),
    ("de", &["german", "deutsch", "德语", "德文"]),
    ("ja", &["japanese", "日本语", "日语"]),
    ("ko", &["korean", "한국어", "朝鲜语", "韩语"]),
    ("ru", &["russian", "русский", "俄语", "俄文"]),
    ("it", &["italian", "italiano", "意大利语"]),
    ("pt", &["portuguese", "português", "葡萄牙语"]),
    ("ar", &["arabic", "العربية", "阿拉伯语"]),
    ("hi", &["hindi", "हिन्दी", "印地语"]),
    ("bn", &["bengali", "বাংলা", "孟加拉语"]),
    ("vi", &["vietnamese", "tiếng việt", "越南语"]),
];

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("failed to render {key} prompt: {source}")]
    Prompt {
        key: &'static str,
        #[source]
        source: PromptError,
    },
    #[error("language model call failed during {stage}: {source}")]
    Model {
        stage: &'static str,
        #[source]
        source: LanguageModelError,
    },
    #[error("{stage} returned no <response> content")]
    EmptyResponse { stage: &'static str },
}

/// True when both names or codes refer to the same language, e.g. `fr` and
/// `French`. Comparison is case-insensitive; empty input never matches.
pub fn is_same_language(first: &str, second: &str) -> bool {
    let first = first.trim().to_lowercase();
    let second = second.trim().to_lowercase();
    if first.is_empty() || second.is_empty() {
        return false;
    }
    if first == second {
        return true;
    }

    LANGUAGE_SYNONYMS
        .iter()
        .any(|(code, names)| {
            names_language(&first, code, names) && names_language(&second, code, names)
        })
}

fn names_language(lang: &str, code: &str, names: &[&str]) -> bool {
    lang == code || names.iter().any(|name| *name == lang)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    pub target_language: String,
    pub source_language: Option<String>,
    pub context: Option<String>,
    pub preserve_format: bool,
    pub skip_same_language: bool,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target_language: target_language.into(),
            source_language: None,
            context: None,
            preserve_format: true,
            skip_same_language: true,
        }
    }

    pub fn with_source_language(mut self, source: Option<String>) -> Self {
        self.source_language = source.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_preserve_format(mut self, preserve: bool) -> Self {
        self.preserve_format = preserve;
        self
    }

    pub fn with_skip_same_language(mut self, skip: bool) -> Self {
        self.skip_same_language = skip;
        self
    }
}

pub struct Translator<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
}

impl<'a> Translator<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self { prompts, sink }
    }

    pub fn detect_language<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        text: &str,
    ) -> Result<String, TranslateError> {
        if text.trim().is_empty() {
            return Err(TranslateError::InvalidInput(
                "text for language detection cannot be empty",
            ));
        }
        let sample: String = text.chars().take(DETECTION_SAMPLE_CHARS).collect();

        let detected = self.complete(
            model,
            "language detection",
            keys::LANGUAGE_DETECTOR_SYSTEM,
            keys::DETECT_LANGUAGE,
            [("sample", sample)],
        )?;
        self.log(LogLevel::Info, format!("Detected language: {detected}"));
        Ok(detected)
    }

    /// Translates one text. With `skip_same_language` set and no source
    /// language given, the source is detected first; a text already in the
    /// target language comes back unchanged without a translation call.
    pub fn translate_text<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        request: &TranslationRequest,
    ) -> Result<String, TranslateError> {
        validate(&request.text, &request.target_language)?;

        let Some(source) = self.resolve_source(
            model,
            &request.text,
            &request.target_language,
            request.source_language.as_deref(),
            request.skip_same_language,
        ) else {
            return Ok(request.text.clone());
        };

        self.log(
            LogLevel::Info,
            format!(
                "Translating text from {} to {}",
                source.as_deref().unwrap_or("auto-detected"),
                request.target_language
            ),
        );

        let translated = self.complete(
            model,
            "translation",
            keys::TRANSLATOR_SYSTEM,
            keys::TRANSLATE,
            [
                ("target_language", request.target_language.clone()),
                ("source_line", source_line(source.as_deref())),
                (
                    "context_line",
                    request
                        .context
                        .as_deref()
                        .map(|context| format!("Context: {context}\n"))
                        .unwrap_or_default(),
                ),
                ("text", request.text.clone()),
                (
                    "format_line",
                    if request.preserve_format {
                        "Please preserve the original formatting.\n".to_string()
                    } else {
                        String::new()
                    },
                ),
            ],
        )?;
        self.log(LogLevel::Info, "Translation completed successfully");
        Ok(translated)
    }

    /// Translates each text independently; a failed item becomes `None`
    /// without stopping the batch.
    pub fn batch_translate<M, I>(
        &self,
        model: &M,
        texts: I,
        target_language: &str,
        source_language: Option<&str>,
        context: Option<&str>,
        skip_same_language: bool,
    ) -> Vec<Option<String>>
    where
        M: LanguageModel + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let texts: Vec<I::Item> = texts.into_iter().collect();
        if texts.is_empty() {
            return Vec::new();
        }
        let total = texts.len();
        self.log(
            LogLevel::Info,
            format!("Batch translating {total} texts to {target_language}"),
        );

        texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let text: &str = text.as_ref();
                let request = TranslationRequest::new(text, target_language)
                    .with_source_language(source_language.map(str::to_string))
                    .with_context(context.map(str::to_string))
                    .with_skip_same_language(skip_same_language);
                match self.translate_text(model, &request) {
                    Ok(translated) => {
                        self.log(LogLevel::Info, format!("Translated text {}/{total}", index + 1));
                        Some(translated)
                    }
                    Err(err) => {
                        self.log(
                            LogLevel::Error,
                            format!("Error translating text {}: {err}", index + 1),
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Like [`Translator::translate_text`] but pins specialised terms to
    /// `glossary` (term to translation). The glossary must not be empty.
    pub fn translate_with_glossary<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        text: &str,
        target_language: &str,
        glossary: &BTreeMap<String, String>,
        source_language: Option<&str>,
        skip_same_language: bool,
    ) -> Result<String, TranslateError> {
        validate(text, target_language)?;
        if glossary.is_empty() {
            return Err(TranslateError::InvalidInput("glossary cannot be empty"));
        }

        let Some(source) =
            self.resolve_source(model, text, target_language, source_language, skip_same_language)
        else {
            return Ok(text.to_string());
        };

        let glossary = glossary
            .iter()
            .map(|(term, translation)| format!("{term}: {translation}"))
            .collect::<Vec<_>>()
            .join("\n");

        self.complete(
            model,
            "glossary translation",
            keys::GLOSSARY_TRANSLATOR_SYSTEM,
            keys::TRANSLATE_WITH_GLOSSARY,
            [
                ("target_language", target_language.to_string()),
                ("source_line", source_line(source.as_deref())),
                ("glossary", glossary),
                ("text", text.to_string()),
            ],
        )
    }

    /// `None` means the text is already in the target language and should be
    /// returned as is. Otherwise yields the source language, if known.
    /// Detection failures only cost the skip check.
    fn resolve_source<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        text: &str,
        target_language: &str,
        source_language: Option<&str>,
        skip_same_language: bool,
    ) -> Option<Option<String>> {
        let source = match source_language.filter(|s| !s.trim().is_empty()) {
            Some(source) => Some(source.to_string()),
            None if skip_same_language => match self.detect_language(model, text) {
                Ok(detected) => {
                    self.log(
                        LogLevel::Info,
                        format!("Auto-detected source language: {detected}"),
                    );
                    Some(detected)
                }
                Err(err) => {
                    self.log(LogLevel::Warn, format!("Failed to auto-detect language: {err}"));
                    None
                }
            },
            None => None,
        };

        if skip_same_language {
            if let Some(source) = source.as_deref() {
                if is_same_language(source, target_language) {
                    self.log(
                        LogLevel::Info,
                        format!(
                            "Source language '{source}' is the same as target language '{target_language}'. Skipping translation."
                        ),
                    );
                    return None;
                }
            }
        }
        Some(source)
    }

    fn complete<M, const N: usize>(
        &self,
        model: &M,
        stage: &'static str,
        system_key: &'static str,
        prompt_key: &'static str,
        arguments: [(&str, String); N],
    ) -> Result<String, TranslateError>
    where
        M: LanguageModel + ?Sized,
    {
        let system = self
            .prompts
            .text(system_key)
            .map_err(|source| TranslateError::Prompt { key: system_key, source })?;
        let prompt = self
            .prompts
            .format_with(prompt_key, arguments)
            .map_err(|source| TranslateError::Prompt { key: prompt_key, source })?;

        self.log(LogLevel::Debug, format!("Prompt for {stage}:\n{prompt}"));
        let raw = model.complete(&system, &prompt).map_err(|source| {
            self.log(LogLevel::Error, format!("Error during {stage}: {source}"));
            TranslateError::Model { stage, source }
        })?;
        self.log(LogLevel::Debug, format!("Response for {stage}:\n{raw}"));

        let response = extract_response(&raw).trim().to_string();
        if response.is_empty() {
            return Err(TranslateError::EmptyResponse { stage });
        }
        Ok(response)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

fn validate(text: &str, target_language: &str) -> Result<(), TranslateError> {
    if text.trim().is_empty() {
        return Err(TranslateError::InvalidInput("text to translate cannot be empty"));
    }
    if target_language.trim().is_empty() {
        return Err(TranslateError::InvalidInput("target language must be provided"));
    }
    Ok(())
}

fn source_line(source: Option<&str>) -> String {
    source
        .map(|source| format!("The source language is: {source}\n"))
        .unwrap_or_default()
}
