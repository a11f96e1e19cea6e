//! The generative text model behind summaries, chat, formatting and query
//! rewriting.

pub mod gemini;
pub mod mock;
pub mod ollama;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

pub use gemini::GeminiGenerator;
pub use mock::MockGenerator;
pub use ollama::OllamaGenerator;

use crate::{Config, Provider};

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("generator returned no text")]
    EmptyResponse,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("generator not configured: {0}")]
    NotConfigured(String),
}

/// Per-call generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Declared output shape (OpenAPI-style schema object). Only honoured by
    /// generators whose [`TextGenerator::supports_schema`] is true.
    pub response_schema: Option<serde_json::Value>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 4096,
            response_schema: None,
        }
    }
}

impl GenerationOptions {
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// A text generator. One call, one reply; implementations never retry.
pub trait TextGenerator: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Whether [`GenerationOptions::response_schema`] is enforced.
    fn supports_schema(&self) -> bool;

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String, GeneratorError>> + Send + 'a>>;
}

/// Build the configured provider for `model`.
pub fn build_generator(
    config: &Config,
    model: &str,
) -> Result<Arc<dyn TextGenerator>, GeneratorError> {
    match config.provider {
        Provider::Gemini => {
            let key = config.google_api_key.clone().ok_or_else(|| {
                GeneratorError::NotConfigured("GOOGLE_API_KEY is not set".into())
            })?;
            Ok(Arc::new(
                GeminiGenerator::new(key, model).with_timeout(config.generator_timeout()),
            ))
        }
        Provider::Ollama => Ok(Arc::new(
            OllamaGenerator::new(&config.ollama_endpoint, model)
                .with_timeout(config.generator_timeout()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_needs_a_key() {
        let config = Config::default();
        assert!(matches!(
            build_generator(&config, "gemini-2.0-flash"),
            Err(GeneratorError::NotConfigured(_))
        ));

        let config = Config {
            google_api_key: Some("k".into()),
            ..Config::default()
        };
        let generator = build_generator(&config, "gemini-2.0-flash").unwrap();
        assert_eq!(generator.name(), "gemini");
        assert!(generator.supports_schema());
    }

    #[test]
    fn ollama_has_no_schema_support() {
        let config = Config {
            provider: Provider::Ollama,
            ..Config::default()
        };
        let generator = build_generator(&config, "llama3").unwrap();
        assert_eq!(generator.name(), "ollama");
        assert!(!generator.supports_schema());
    }

    #[test]
    fn default_options() {
        let options = GenerationOptions::default();
        assert_eq!(options.max_output_tokens, 4096);
        assert!(options.response_schema.is_none());
    }
}
