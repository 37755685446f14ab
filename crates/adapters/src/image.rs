use std::fs;
use std::path::Path;
use std::time::Duration;

use log::info;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderValue};

use novelist_core::config::{ImageConfig, ENV_STABILITY_API_KEY};
use novelist_core::{ImageSynthesisError, ImageSynthesizer};

use crate::error::AdapterError;
use crate::retry::{call_with_retry, RetryConfig};

/// Stability AI `stable-image/generate` client. Each call posts the prompt as
/// multipart form data and writes the returned image bytes to disk.
pub struct StabilityImageClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    output_format: String,
    retry: RetryConfig,
}

impl StabilityImageClient {
    /// A missing key is reported when an image is requested, not here, so a
    /// run without cover credentials still proceeds.
    pub fn from_config(config: &ImageConfig) -> Result<Self, AdapterError> {
        if config.endpoint.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "image endpoint must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout.max(1)))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
            api_key: Some(config.api_key.trim())
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            output_format: config.output_format.trim().to_lowercase(),
            retry: RetryConfig::new(config.max_retries, Duration::ZERO),
        })
    }

    fn generate_once(&self, api_key: &str, prompt: &str) -> Result<Vec<u8>, AdapterError> {
        let form = Form::new()
            .text("prompt", prompt.to_string())
            .text("output_format", self.output_format.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header(header::ACCEPT, HeaderValue::from_static("image/*"))
            .multipart(form)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(AdapterError::HttpStatus { status, body });
        }

        let bytes = response.bytes()?;
        if bytes.is_empty() {
            return Err(AdapterError::EmptyResponse);
        }
        Ok(bytes.to_vec())
    }

    fn synthesize(&self, prompt: &str, output_path: &Path) -> Result<(), AdapterError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AdapterError::MissingApiKey(ENV_STABILITY_API_KEY))?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AdapterError::io(parent, err))?;
            }
        }

        let image = call_with_retry(|| self.generate_once(api_key, prompt), &self.retry)?;
        fs::write(output_path, image).map_err(|err| AdapterError::io(output_path, err))?;
        info!("Image generated successfully: {}", output_path.display());
        Ok(())
    }
}

impl ImageSynthesizer for StabilityImageClient {
    fn synthesize_image(&self, prompt: &str, output_path: &Path) -> Result<(), ImageSynthesisError> {
        Ok(self.synthesize(prompt, output_path)?)
    }

    fn file_extension(&self) -> &str {
        match self.output_format.as_str() {
            "jpeg" => "jpg",
            other => other,
        }
    }
}
