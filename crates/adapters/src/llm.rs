use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{self, HeaderValue};
use serde::{Deserialize, Serialize};

use novelist_core::config::{LlmConfig, ENV_OPENAI_API_KEY};
use novelist_core::{LanguageModel, LanguageModelError};

use crate::base_url::resolve_base_url;
use crate::error::AdapterError;
use crate::retry::{call_with_retry, RetryConfig};

/// Default endpoint per `interface_format`, and whether it needs a key.
fn provider_defaults(interface_format: &str) -> Option<(&'static str, bool)> {
    match interface_format {
        "openai" => Some(("https://api.openai.com/v1", true)),
        "deepseek" => Some(("https://api.deepseek.com/v1", true)),
        "ollama" => Some(("http://localhost:11434/v1", false)),
        "grok" => Some(("https://api.x.ai/v1", true)),
        _ => None,
    }
}

pub fn create_completion_client(config: &LlmConfig) -> Result<Box<dyn LanguageModel>, AdapterError> {
    Ok(Box::new(OpenAiChatClient::from_config(config)?))
}

/// Blocking client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiChatClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    model_name: String,
    max_tokens: Option<u32>,
    temperature: f32,
    retry: RetryConfig,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, AdapterError> {
        let format = config.interface_format.trim().to_lowercase();
        let (default_url, requires_key) = provider_defaults(&format).ok_or_else(|| {
            AdapterError::InvalidConfig(format!("unknown interface_format: {format}"))
        })?;

        let api_key = Some(config.api_key.trim())
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        if requires_key && api_key.is_none() {
            return Err(AdapterError::MissingApiKey(ENV_OPENAI_API_KEY));
        }

        Self::new(
            resolve_base_url(&config.base_url, default_url),
            api_key,
            config.model_name.clone(),
            config.max_tokens,
            config.temperature,
            config.timeout,
        )
        .map(|client| {
            client.with_retry(RetryConfig::new(
                config.max_retries,
                Duration::from_millis(config.retry_delay_ms),
            ))
        })
    }

    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model_name: String,
        max_tokens: u32,
        temperature: f32,
        timeout: u64,
    ) -> Result<Self, AdapterError> {
        if base_url.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        if model_name.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "model_name must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout.max(1)))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model_name,
            max_tokens: if max_tokens == 0 {
                None
            } else {
                Some(max_tokens)
            },
            temperature,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body<'a>(&'a self, system_prompt: &'a str, user_prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model_name,
            messages: vec![
                ChatMessageRequest {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessageRequest {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn complete_once(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AdapterError> {
        let mut request = self.client.post(&self.url).header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .json(&self.request_body(system_prompt, user_prompt))
            .send()?;
        handle_chat_response(response)
    }
}

impl LanguageModel for OpenAiChatClient {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LanguageModelError> {
        Ok(call_with_retry(|| self.complete_once(system_prompt, user_prompt), &self.retry)?)
    }
}

fn handle_chat_response(response: reqwest::blocking::Response) -> Result<String, AdapterError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        return Err(AdapterError::HttpStatus { status, body });
    }

    let parsed: ChatCompletionResponse = response.json()?;
    extract_choice_content(parsed).ok_or(AdapterError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_choice_content(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.and_then(|message| message.content))
        .find(|content| !content.trim().is_empty())
}
