mod base_url;
mod error;
mod export;
mod image;
mod llm;
mod retry;

pub use base_url::{check_base_url, resolve_base_url};
pub use error::AdapterError;
pub use export::{render_markdown, FileExporter};
pub use image::StabilityImageClient;
pub use llm::{create_completion_client, OpenAiChatClient};
pub use retry::{call_with_retry, RetryConfig};
