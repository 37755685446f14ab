use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";
pub const ENV_MAX_TOKENS: &str = "MAX_TOKENS";
pub const ENV_STABILITY_API_KEY: &str = "STABILITY_API_KEY";

fn default_interface_format() -> String {
    "openai".to_string()
}

fn default_model_name() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_timeout() -> u64 {
    600
}

fn default_max_retries() -> usize {
    3
}

fn default_image_endpoint() -> String {
    "https://api.stability.ai/v2beta/stable-image/generate/sd3".to_string()
}

fn default_image_format() -> String {
    "jpeg".to_string()
}

fn default_image_timeout() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_author() -> String {
    "AI".to_string()
}

fn default_min_chapter_chars() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("environment variable `{name}` has invalid value `{value}`")]
    InvalidEnv { name: &'static str, value: String },
}

/// Chat-completion backend settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    /// Empty means the provider's default endpoint.
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_interface_format")]
    pub interface_format: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            interface_format: default_interface_format(),
            model_name: default_model_name(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay_ms: 0,
        }
    }
}

/// Cover image backend settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_image_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_image_format")]
    pub output_format: String,
    #[serde(default = "default_image_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_image_endpoint(),
            output_format: default_image_format(),
            timeout: default_image_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_min_chapter_chars")]
    pub min_chapter_chars: usize,
    #[serde(default = "default_max_retries")]
    pub chapter_attempts: usize,
    /// Fail a run when an outline step comes back empty instead of carrying
    /// the empty text forward.
    #[serde(default)]
    pub strict_outline: bool,
    #[serde(default = "default_true")]
    pub generate_cover: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            author: default_author(),
            min_chapter_chars: default_min_chapter_chars(),
            chapter_attempts: default_max_retries(),
            strict_outline: false,
            generate_cover: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptConfig {
    #[serde(default)]
    pub custom_directories: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Loads `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    /// Overlays backend settings from the environment. `lookup` is usually
    /// `|name| std::env::var(name).ok()`; empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = read(ENV_OPENAI_API_KEY) {
            self.llm.api_key = value;
        }
        if let Some(value) = read(ENV_OPENAI_BASE_URL) {
            self.llm.base_url = value;
        }
        if let Some(value) = read(ENV_LLM_MODEL) {
            self.llm.model_name = value;
        }
        if let Some(value) = read(ENV_MAX_TOKENS) {
            self.llm.max_tokens = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_MAX_TOKENS,
                value: value.clone(),
            })?;
        }
        if let Some(value) = read(ENV_STABILITY_API_KEY) {
            self.image.api_key = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn empty_input_yields_defaults() {
        let config = Config::from_json_str("  ").unwrap();
        assert_eq!(config.llm.model_name, "gpt-3.5-turbo");
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.generation.min_chapter_chars, 1000);
        assert_eq!(config.generation.output_dir, PathBuf::from("output"));
        assert_eq!(config.generation.author, "AI");
        assert!(config.generation.generate_cover);
        assert!(!config.generation.strict_outline);
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let json = r#"{
            "llm": { "api_key": "sk-test", "interface_format": "deepseek" },
            "generation": { "author": "Ada" }
        }"#;

        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.interface_format, "deepseek");
        assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.generation.author, "Ada");
        assert_eq!(config.generation.chapter_attempts, 3);
        assert_eq!(config.image.output_format, "jpeg");
    }

    #[test]
    fn round_trips_through_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.llm.model_name = "gpt-4o-mini".into();
        config.prompts.custom_directories.push("prompts".into());
        config.to_path(&path).unwrap();

        assert_eq!(Config::from_path(&path).unwrap(), config);
        assert_eq!(
            Config::load_or_default(&temp.path().join("missing.json")).unwrap(),
            Config::default()
        );
    }

    #[test]
    fn env_overrides_replace_non_empty_values() {
        let env = HashMap::from([
            (ENV_OPENAI_API_KEY, "sk-env"),
            (ENV_OPENAI_BASE_URL, ""),
            (ENV_LLM_MODEL, "deepseek-chat"),
            (ENV_MAX_TOKENS, "4096"),
            (ENV_STABILITY_API_KEY, "stab"),
        ]);

        let mut config = Config::default();
        config.llm.base_url = "http://localhost:8080/v1".into();
        config
            .apply_env_overrides(|name| env.get(name).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.llm.api_key, "sk-env");
        assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
        assert_eq!(config.llm.model_name, "deepseek-chat");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.image.api_key, "stab");
    }

    #[test]
    fn invalid_max_tokens_is_reported() {
        let mut config = Config::default();
        let error = config
            .apply_env_overrides(|name| (name == ENV_MAX_TOKENS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidEnv {
                name: ENV_MAX_TOKENS,
                ..
            }
        ));
    }
}
