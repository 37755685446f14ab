use std::io;
use std::path::Path;

use novelist_core::{ImageSynthesisError, LanguageModelError};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),
    #[error("unexpected http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("io error at `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("operation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        source: Box<AdapterError>,
    },
    #[error("API returned an empty response")]
    EmptyResponse,
}

impl AdapterError {
    pub fn retry_exhausted(attempts: usize, source: AdapterError) -> Self {
        AdapterError::RetryExhausted {
            attempts,
            source: Box::new(source),
        }
    }

    pub fn io(path: &Path, source: io::Error) -> Self {
        AdapterError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Configuration problems are not worth retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AdapterError::InvalidConfig(_) | AdapterError::MissingApiKey(_)
        )
    }
}

impl From<AdapterError> for LanguageModelError {
    fn from(error: AdapterError) -> Self {
        LanguageModelError::new(error)
    }
}

impl From<AdapterError> for ImageSynthesisError {
    fn from(error: AdapterError) -> Self {
        ImageSynthesisError::new(error)
    }
}
